// ABOUTME: Graduated delay schedule between readiness attempts.
// ABOUTME: Short fixed waits first, then a linear ramp up to a ceiling.

use std::time::Duration;

/// Delay to wait after a failed attempt.
///
/// Attempts are numbered from 1. The first `early_attempts` attempts wait
/// `early_delay`; later ones wait `late_base + attempt * late_step`, capped
/// at `late_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub early_attempts: u32,
    pub early_delay: Duration,
    pub late_base: Duration,
    pub late_step: Duration,
    pub late_max: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            early_attempts: 3,
            early_delay: Duration::from_secs(5),
            late_base: Duration::from_secs(10),
            late_step: Duration::from_secs(2),
            late_max: Duration::from_secs(30),
        }
    }
}

impl BackoffSchedule {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt <= self.early_attempts {
            return self.early_delay;
        }
        let ramp = self.late_base.saturating_add(self.late_step.saturating_mul(attempt));
        ramp.min(self.late_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_attempts_use_fixed_delay() {
        let schedule = BackoffSchedule::default();
        for attempt in 1..=3 {
            assert_eq!(schedule.delay_after(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn later_attempts_ramp_linearly() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_after(4), Duration::from_secs(18));
        assert_eq!(schedule.delay_after(5), Duration::from_secs(20));
        assert_eq!(schedule.delay_after(9), Duration::from_secs(28));
    }

    #[test]
    fn ramp_is_capped() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_after(10), Duration::from_secs(30));
        assert_eq!(schedule.delay_after(1_000), Duration::from_secs(30));
        assert_eq!(schedule.delay_after(u32::MAX), Duration::from_secs(30));
    }
}
