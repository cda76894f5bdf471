// ABOUTME: Tunables for the readiness prober, read from the `probe` config section.
// ABOUTME: Every wait, cap, and timeout the prober uses lives here.

use serde::Deserialize;
use std::time::Duration;

use super::BackoffSchedule;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProbePolicy {
    /// Wait before the first attempt, for images known to boot slowly.
    #[serde(with = "humantime_serde")]
    pub initial_wait: Duration,

    pub max_attempts: u32,

    /// Wall-clock bound on the whole probe.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    pub early_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub early_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub late_base: Duration,

    #[serde(with = "humantime_serde")]
    pub late_step: Duration,

    #[serde(with = "humantime_serde")]
    pub late_max: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        let schedule = BackoffSchedule::default();
        Self {
            initial_wait: Duration::ZERO,
            max_attempts: 30,
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(15),
            early_attempts: schedule.early_attempts,
            early_delay: schedule.early_delay,
            late_base: schedule.late_base,
            late_step: schedule.late_step,
            late_max: schedule.late_max,
        }
    }
}

impl ProbePolicy {
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            early_attempts: self.early_attempts,
            early_delay: self.early_delay,
            late_base: self.late_base,
            late_step: self.late_step,
            late_max: self.late_max,
        }
    }
}
