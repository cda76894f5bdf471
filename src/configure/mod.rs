// ABOUTME: Instance configuration, application build, and application start.
// ABOUTME: Defines the Configurator trait and its ansible-playbook implementation.

mod ansible;
mod error;
mod retry;

pub use ansible::{AnsibleConfigurator, AnsibleSettings, REPO_TOKEN_ENV};
pub use error::ConfigureError;
pub use retry::{RetryPolicy, RetrySettings};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::logs::LogSink;
use crate::types::AccessToken;

/// The three procedures a configurator runs against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Configure,
    Build,
    Deploy,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Configure => "configure",
            Task::Build => "build",
            Task::Deploy => "deploy",
        }
    }

    /// Capitalised name used in progress lines ("Configuration attempt 2/3").
    pub fn label(&self) -> &'static str {
        match self {
            Task::Configure => "Configuration",
            Task::Build => "Build",
            Task::Deploy => "Deploy",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host and application a configurator works on.
#[derive(Debug, Clone)]
pub struct AppTarget {
    pub host: String,
    pub repo_url: String,
    pub branch: String,
    pub framework: String,
    pub env_vars: BTreeMap<String, String>,
    pub access_token: Option<AccessToken>,
}

/// Runs configure, build, and deploy against a reachable host.
///
/// Each operation retries internally and only returns the final failure.
/// Progress lines go to the sink.
#[async_trait]
pub trait Configurator: Send + Sync {
    async fn configure(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError>;

    async fn build(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError>;

    /// Start the application. Returns its public URL.
    async fn deploy(&self, target: &AppTarget, sink: &LogSink) -> Result<String, ConfigureError>;
}
