// ABOUTME: Errors from the SSH login check.
// ABOUTME: Credential problems are told apart from host and network failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection to {host}:{port} timed out after {after:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        after: Duration,
    },

    #[error("server rejected every offered key")]
    AuthenticationFailed,

    #[error("no SSH credentials available: {0}")]
    NoCredentials(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("remote command failed: {0}")]
    CommandFailed(String),

    #[error("remote command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("channel closed without an exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

impl Error {
    /// Missing or unreadable local key material, as opposed to a remote fault.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Error::NoCredentials(_) | Error::KeyLoadFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
