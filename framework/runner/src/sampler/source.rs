use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use sysinfo::{Disks, Networks, System};

use crate::sampler::{SampleSource, SystemSample};

/// Assumed link speed used to turn network throughput into a percentage, 1 Gbit/s.
const LINK_BYTES_PER_SEC: f64 = 125_000_000.0;

/// Samples the host with [sysinfo].
///
/// CPU usage needs two refreshes to be meaningful, so the first sample reports the CPU as idle.
pub struct SysinfoSource {
    system: System,
    last_network_total: Option<(Instant, u64)>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system,
            last_network_total: None,
        }
    }

    fn network_pct(&mut self) -> f64 {
        let networks = Networks::new_with_refreshed_list();
        let total = networks
            .list()
            .values()
            .map(|data| data.total_received() + data.total_transmitted())
            .sum::<u64>();
        let now = Instant::now();

        let pct = match self.last_network_total {
            Some((at, previous)) => {
                let elapsed = now.duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    let bytes_per_sec = total.saturating_sub(previous) as f64 / elapsed;
                    (bytes_per_sec / LINK_BYTES_PER_SEC * 100.0).clamp(0.0, 100.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.last_network_total = Some((now, total));
        pct
    }
}

fn disk_pct() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks.list().iter().fold((0u64, 0u64), |(total, available), disk| {
        (total + disk.total_space(), available + disk.available_space())
    });

    percentage(total.saturating_sub(available), total)
}

fn percentage(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

impl SampleSource for SysinfoSource {
    fn sample(&mut self, active_connections: u64) -> SystemSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let cpu_pct = f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0);
        let mem_pct = percentage(self.system.used_memory(), self.system.total_memory());

        SystemSample {
            timestamp: Utc::now(),
            cpu_pct,
            mem_pct,
            disk_pct: disk_pct(),
            net_pct: self.network_pct(),
            active_connections,
        }
    }
}

/// Produces random values in plausible ranges, for demonstrations where host metrics are not
/// wanted. The connection count is random as well.
#[derive(Debug, Default)]
pub struct SimulatedSource;

impl SampleSource for SimulatedSource {
    fn sample(&mut self, _active_connections: u64) -> SystemSample {
        let mut rng = rand::thread_rng();

        SystemSample {
            timestamp: Utc::now(),
            cpu_pct: rng.gen_range(0.0..100.0),
            mem_pct: rng.gen_range(40.0..90.0),
            disk_pct: rng.gen_range(20.0..50.0),
            net_pct: rng.gen_range(0.0..100.0),
            active_connections: rng.gen_range(100..600),
        }
    }
}
