// ABOUTME: Authenticated confirmation that an instance accepts administrative logins.
// ABOUTME: The SSH implementation logs in and runs `echo ready`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::ssh::{Session, SessionConfig};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Credential material is absent locally. Retrying cannot help.
    #[error("credentials unavailable: {0}")]
    MissingCredentials(String),

    #[error("handshake failed: {0}")]
    Failed(String),

    #[error("unexpected handshake reply: {0:?}")]
    UnexpectedReply(String),
}

impl From<crate::ssh::Error> for HandshakeError {
    fn from(err: crate::ssh::Error) -> Self {
        if err.is_credential_problem() {
            HandshakeError::MissingCredentials(err.to_string())
        } else {
            HandshakeError::Failed(err.to_string())
        }
    }
}

/// Second stage of a readiness probe, run once the port accepts connections.
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Check locally that the credentials needed for [`Handshake::handshake`]
    /// exist. Called once before polling starts.
    async fn check_credentials(&self) -> Result<(), HandshakeError>;

    async fn handshake(&self, host: &str, port: u16) -> Result<(), HandshakeError>;
}

/// Logs in over SSH and runs `echo ready`.
#[derive(Debug, Clone)]
pub struct SshHandshake {
    user: String,
    key_path: Option<PathBuf>,
    known_hosts_path: Option<PathBuf>,
    trust_on_first_use: bool,
    connect_timeout: Duration,
}

impl SshHandshake {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key_path: None,
            known_hosts_path: None,
            trust_on_first_use: true,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn session_config(&self, host: &str, port: u16) -> SessionConfig {
        SessionConfig {
            host: host.to_string(),
            port,
            user: self.user.clone(),
            key_path: self.key_path.clone(),
            known_hosts_path: self.known_hosts_path.clone(),
            trust_on_first_use: self.trust_on_first_use,
            timeout: self.connect_timeout,
        }
    }
}

#[async_trait]
impl Handshake for SshHandshake {
    async fn check_credentials(&self) -> Result<(), HandshakeError> {
        Session::check_credentials(&self.session_config("localhost", 22))
            .await
            .map_err(|e| HandshakeError::MissingCredentials(e.to_string()))
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<(), HandshakeError> {
        let session = Session::connect(&self.session_config(host, port)).await?;
        let reply = session.run("echo ready").await;

        if let Err(e) = session.close().await {
            tracing::debug!(host, error = %e, "SSH disconnect after handshake failed");
        }

        let reply = reply?;
        if reply.success() && reply.stdout.trim() == "ready" {
            Ok(())
        } else {
            Err(HandshakeError::UnexpectedReply(
                format!("{}{}", reply.stdout, reply.stderr).trim().to_string(),
            ))
        }
    }
}
