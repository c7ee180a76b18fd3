use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many latency samples a run keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRetention {
    /// Keep every sample. Memory grows with the length of the run.
    Unbounded,
    /// Keep the most recent `n` samples.
    Bounded(usize),
}

impl Default for HistoryRetention {
    fn default() -> Self {
        HistoryRetention::Bounded(10_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
}

/// Append only record of successful attempt latencies, in the order they were recorded.
#[derive(Debug)]
pub(crate) struct LatencyHistory {
    retention: HistoryRetention,
    samples: VecDeque<LatencySample>,
    evicted: u64,
}

impl LatencyHistory {
    pub fn new(retention: HistoryRetention) -> Self {
        let capacity = match retention {
            HistoryRetention::Unbounded => 0,
            HistoryRetention::Bounded(n) => n.min(1024),
        };

        Self {
            retention,
            samples: VecDeque::with_capacity(capacity),
            evicted: 0,
        }
    }

    pub fn push(&mut self, sample: LatencySample) {
        if let HistoryRetention::Bounded(max) = self.retention {
            if max == 0 {
                self.evicted += 1;
                return;
            }
            while self.samples.len() >= max {
                self.samples.pop_front();
                self.evicted += 1;
            }
        }

        self.samples.push_back(sample);
    }

    /// Number of samples dropped to stay within the retention limit.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &LatencySample> {
        self.samples.iter()
    }
}
