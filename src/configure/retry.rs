// ABOUTME: Bounded retry with exponential delay for configurator tasks.
// ABOUTME: Reports each attempt and each failure to the deployment log sink.

use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::logs::LogSink;

const MAX_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            attempts,
            initial_delay,
            multiplier,
        }
    }

    /// A single attempt with no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Checked against `attempts >= 1` and a finite `multiplier >= 1.0`.
    pub fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }

    /// Grows `delay` by the multiplier, capped at `MAX_DELAY`. A factor that
    /// cannot produce a valid duration keeps the delay unchanged.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map(|next| next.min(MAX_DELAY))
            .unwrap_or_else(|_| delay.min(MAX_DELAY))
    }

    /// Run `op` until it succeeds or attempts run out. `op` receives the
    /// 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, sink: &LogSink, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max = self.attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            sink.debug(format!("{label} attempt {attempt}/{max}"));
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max => {
                    sink.warn(format!("{label} failed after {max} attempts: {e}"));
                    return Err(e);
                }
                Err(e) => {
                    sink.warn(format!(
                        "{label} attempt {attempt} failed, retrying in {:.0} seconds: {e}",
                        delay.as_secs_f64()
                    ));
                    tracing::debug!(label, attempt, ?delay, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Per-task retry policies, from the `configurator.retries` config section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub configure: RetryPolicy,
    pub build: RetryPolicy,
    pub deploy: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            configure: RetryPolicy::new(3, Duration::from_secs(10), 1.5),
            build: RetryPolicy::new(3, Duration::from_secs(15), 2.0),
            deploy: RetryPolicy::new(3, Duration::from_secs(15), 2.0),
        }
    }
}
