// ABOUTME: Readiness prober: bounded TCP polling plus an optional handshake.
// ABOUTME: Exhaustion is an outcome, not an error; only missing credentials fail.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::logs::LogSink;

use super::{Handshake, HandshakeError, ProbePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The port answered and, if configured, the handshake succeeded.
    Confirmed { attempts: u32 },
    /// Attempts or time ran out first. Callers proceed anyway.
    Unconfirmed { attempts: u32, elapsed: Duration },
}

impl ProbeOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ProbeOutcome::Confirmed { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("cannot verify SSH readiness: {0}")]
    MissingCredentials(String),
}

/// Waits for a host's administrative port to come up.
#[derive(Clone)]
pub struct ReadinessProber {
    policy: ProbePolicy,
    handshake: Option<Arc<dyn Handshake>>,
}

impl std::fmt::Debug for ReadinessProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessProber")
            .field("policy", &self.policy)
            .field("handshake", &self.handshake.is_some())
            .finish()
    }
}

impl ReadinessProber {
    pub fn new(policy: ProbePolicy) -> Self {
        Self {
            policy,
            handshake: None,
        }
    }

    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// Poll `host:port` until it is reachable, attempts run out, or
    /// `timeout` elapses.
    ///
    /// Never sleeps past the deadline. Progress goes to `sink`: an Info line
    /// per outcome and per failed attempt, with Debug detail alongside.
    pub async fn wait_until_reachable(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        sink: &LogSink,
    ) -> Result<ProbeOutcome, ProbeError> {
        let policy = &self.policy;
        let schedule = policy.schedule();

        sink.info(format!("Checking SSH connectivity to {host}:{port}"));

        if let Some(handshake) = &self.handshake {
            handshake
                .check_credentials()
                .await
                .map_err(|e| ProbeError::MissingCredentials(e.to_string()))?;
        }

        let started = Instant::now();
        let deadline = started + timeout;

        if !policy.initial_wait.is_zero() {
            let wait = policy.initial_wait.min(timeout);
            sink.debug(format!(
                "Waiting {}s for the instance to boot before probing",
                wait.as_secs()
            ));
            tokio::time::sleep(wait).await;
        }

        let mut attempts = 0;
        while attempts < policy.max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            attempts += 1;

            sink.debug(format!("Attempting SSH port check (attempt {attempts})"));
            match port_open(host, port, policy.connect_timeout.min(remaining)).await {
                Ok(()) => {
                    sink.info(format!("SSH port {port} is open on {host}"));
                    if self.confirm(host, port, attempts, deadline, sink).await? {
                        return Ok(ProbeOutcome::Confirmed { attempts });
                    }
                }
                Err(reason) => sink.debug(format!(
                    "SSH port not ready (attempt {attempts}): {reason}"
                )),
            }
            sink.info(format!(
                "SSH not ready yet (attempt {attempts}/{})",
                policy.max_attempts
            ));

            if attempts == policy.max_attempts {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let wait = schedule.delay_after(attempts).min(remaining);
            sink.debug(format!(
                "Waiting {} seconds before next attempt...",
                wait.as_secs()
            ));
            tokio::time::sleep(wait).await;
        }

        let elapsed = started.elapsed();
        sink.info(format!(
            "Could not confirm SSH readiness on {host} after {attempts} attempts ({}s); continuing",
            elapsed.as_secs()
        ));
        tracing::warn!(host, attempts, ?elapsed, "readiness unconfirmed");
        Ok(ProbeOutcome::Unconfirmed { attempts, elapsed })
    }

    /// Returns true when the host is confirmed ready.
    async fn confirm(
        &self,
        host: &str,
        port: u16,
        attempt: u32,
        deadline: Instant,
        sink: &LogSink,
    ) -> Result<bool, ProbeError> {
        let Some(handshake) = &self.handshake else {
            return Ok(true);
        };

        sink.debug(format!("Testing SSH authentication to {host}"));
        let bound = self
            .policy
            .handshake_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        match tokio::time::timeout(bound, handshake.handshake(host, port)).await {
            Ok(Ok(())) => {
                sink.info(format!("SSH authentication successful to {host}"));
                Ok(true)
            }
            Ok(Err(HandshakeError::MissingCredentials(reason))) => {
                Err(ProbeError::MissingCredentials(reason))
            }
            Ok(Err(e)) => {
                sink.debug(format!("SSH auth test failed (attempt {attempt}): {e}"));
                Ok(false)
            }
            Err(_) => {
                sink.debug(format!("SSH test timed out (attempt {attempt})"));
                Ok(false)
            }
        }
    }
}

async fn port_open(host: &str, port: u16, connect_timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {connect_timeout:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{LogEvent, LogLevel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    fn fast_policy() -> ProbePolicy {
        ProbePolicy {
            max_attempts: 5,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(1),
            early_attempts: 5,
            early_delay: Duration::from_millis(10),
            ..ProbePolicy::default()
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn drain(rx: &mut crate::logs::LogReceiver) -> Vec<LogEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    struct FlakyHandshake {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handshake for FlakyHandshake {
        async fn check_credentials(&self) -> Result<(), HandshakeError> {
            Ok(())
        }

        async fn handshake(&self, _host: &str, _port: u16) -> Result<(), HandshakeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(HandshakeError::Failed("connection reset".into()));
            }
            Ok(())
        }
    }

    struct NoKeys;

    #[async_trait]
    impl Handshake for NoKeys {
        async fn check_credentials(&self) -> Result<(), HandshakeError> {
            Err(HandshakeError::MissingCredentials("no key at /tmp/deploy_key".into()))
        }

        async fn handshake(&self, _host: &str, _port: u16) -> Result<(), HandshakeError> {
            unreachable!("credentials are checked first")
        }
    }

    #[tokio::test]
    async fn open_port_without_handshake_is_confirmed_on_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (sink, mut rx) = LogSink::channel();

        let outcome = ReadinessProber::new(fast_policy())
            .wait_until_reachable("127.0.0.1", port, Duration::from_secs(5), &sink)
            .await
            .unwrap();

        assert_eq!(outcome, ProbeOutcome::Confirmed { attempts: 1 });
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.level == LogLevel::Info
            && e.message == format!("SSH port {port} is open on 127.0.0.1")));
    }

    #[tokio::test]
    async fn failed_handshakes_keep_polling() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handshake = Arc::new(FlakyHandshake {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });

        let (sink, mut rx) = LogSink::channel();
        let outcome = ReadinessProber::new(fast_policy())
            .with_handshake(handshake.clone())
            .wait_until_reachable("127.0.0.1", port, Duration::from_secs(5), &sink)
            .await
            .unwrap();

        assert_eq!(outcome, ProbeOutcome::Confirmed { attempts: 3 });
        assert_eq!(handshake.calls.load(Ordering::SeqCst), 3);
        let not_ready = drain(&mut rx)
            .iter()
            .filter(|e| e.level == LogLevel::Info && e.message.starts_with("SSH not ready yet"))
            .count();
        assert_eq!(not_ready, 2);
    }

    #[tokio::test]
    async fn attempt_cap_yields_unconfirmed() {
        let port = closed_port().await;
        let (sink, mut rx) = LogSink::channel();
        let policy = ProbePolicy {
            max_attempts: 3,
            ..fast_policy()
        };

        let outcome = ReadinessProber::new(policy)
            .wait_until_reachable("127.0.0.1", port, Duration::from_secs(10), &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, ProbeOutcome::Unconfirmed { attempts: 3, .. }));
        let events = drain(&mut rx);
        let attempts = events
            .iter()
            .filter(|e| e.level == LogLevel::Debug && e.message.starts_with("Attempting SSH port check"))
            .count();
        assert_eq!(attempts, 3);
        let summaries: Vec<&str> = events
            .iter()
            .filter(|e| e.level == LogLevel::Info && e.message.starts_with("SSH not ready yet"))
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(
            summaries,
            vec![
                "SSH not ready yet (attempt 1/3)",
                "SSH not ready yet (attempt 2/3)",
                "SSH not ready yet (attempt 3/3)",
            ]
        );
        assert!(events
            .iter()
            .any(|e| e.level == LogLevel::Info && e.message.starts_with("Could not confirm SSH readiness")));
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_bound_is_never_overshot() {
        let port = closed_port().await;
        let policy = ProbePolicy {
            max_attempts: 100,
            early_attempts: 3,
            early_delay: Duration::from_secs(5),
            ..ProbePolicy::default()
        };
        let timeout = Duration::from_secs(12);

        let started = Instant::now();
        let outcome = ReadinessProber::new(policy)
            .wait_until_reachable("127.0.0.1", port, timeout, &LogSink::discard())
            .await
            .unwrap();

        assert!(!outcome.is_confirmed());
        assert!(started.elapsed() <= timeout);
        match outcome {
            ProbeOutcome::Unconfirmed { attempts, .. } => assert!(attempts <= 3),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_polling() {
        let port = closed_port().await;
        let (sink, mut rx) = LogSink::channel();

        let err = ReadinessProber::new(fast_policy())
            .with_handshake(Arc::new(NoKeys))
            .wait_until_reachable("127.0.0.1", port, Duration::from_secs(5), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::MissingCredentials(_)));
        assert!(
            !drain(&mut rx)
                .iter()
                .any(|e| e.message.starts_with("Attempting SSH port check"))
        );
    }
}
