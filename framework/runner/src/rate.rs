use std::time::Duration;

/// How the target rate of a scenario is applied to its workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PacingMode {
    /// Every worker is paced towards the target rate on its own, so the combined rate can approach
    /// `concurrency * target_rate`.
    #[default]
    #[display("per_worker")]
    PerWorker,
    /// The target rate is shared between the workers, each one is paced towards
    /// `target_rate / concurrency`.
    #[display("aggregate")]
    Aggregate,
}

/// Delay in milliseconds before the next attempt of a worker: `max(0, 1000 / rate - last)`.
pub fn next_delay_ms(target_rate: f64, last_attempt_duration_ms: f64) -> f64 {
    (1000.0 / target_rate - last_attempt_duration_ms).max(0.0)
}

/// Computes the pacing delay a worker waits between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGovernor {
    /// Time between attempt starts that this governor aims for.
    interval: Duration,
}

impl RateGovernor {
    /// The target rate must be positive and finite, which scenario validation guarantees.
    pub fn new(target_rate: f64, concurrency: usize, mode: PacingMode) -> Self {
        let interval_s = match mode {
            PacingMode::PerWorker => 1.0 / target_rate,
            PacingMode::Aggregate => concurrency.max(1) as f64 / target_rate,
        };

        Self {
            interval: Duration::try_from_secs_f64(interval_s).unwrap_or(Duration::MAX),
        }
    }

    pub fn next_delay(&self, last_attempt_duration: Duration) -> Duration {
        self.interval.saturating_sub(last_attempt_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_formula() {
        assert_eq!(70.0, next_delay_ms(10.0, 30.0));
        assert_eq!(0.0, next_delay_ms(10.0, 100.0));
        assert_eq!(0.0, next_delay_ms(10.0, 250.0));
        assert_eq!(1000.0, next_delay_ms(1.0, 0.0));
    }

    #[test]
    fn per_worker_ignores_concurrency() {
        let governor = RateGovernor::new(10.0, 50, PacingMode::PerWorker);
        assert_eq!(Duration::from_millis(100), governor.interval);
        assert_eq!(
            Duration::from_millis(70),
            governor.next_delay(Duration::from_millis(30))
        );
        assert_eq!(
            Duration::ZERO,
            governor.next_delay(Duration::from_millis(300))
        );
    }

    #[test]
    fn aggregate_divides_rate_between_workers() {
        let governor = RateGovernor::new(10.0, 5, PacingMode::Aggregate);
        assert_eq!(Duration::from_millis(500), governor.interval);
        assert_eq!(
            Duration::from_millis(400),
            governor.next_delay(Duration::from_millis(100))
        );
    }

    #[test]
    fn tiny_rate_does_not_overflow() {
        let governor = RateGovernor::new(f64::MIN_POSITIVE, 1, PacingMode::PerWorker);
        assert_eq!(Duration::MAX, governor.interval);
    }

    #[test]
    fn governor_matches_formula() {
        for (rate, last_ms) in [(3.0, 12.0), (100.0, 2.5), (0.5, 1999.0)] {
            let governor = RateGovernor::new(rate, 4, PacingMode::PerWorker);
            let delay = governor.next_delay(Duration::from_secs_f64(last_ms / 1000.0));
            let expected = next_delay_ms(rate, last_ms);
            assert!((delay.as_secs_f64() * 1000.0 - expected).abs() < 1e-3);
        }
    }
}
