// ABOUTME: Deployment lifecycle status as persisted and shown to callers.
// ABOUTME: Encodes which statuses are terminal and which can be retried.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted status of a deployment.
///
/// The happy path is linear: `Pending -> Provisioning -> Configuring ->
/// Building -> Deploying -> Success`. Any phase failure jumps to `Failed`.
/// `Cancelled` is only ever set from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Provisioning,
    Configuring,
    Building,
    Deploying,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Provisioning => "provisioning",
            DeploymentStatus::Configuring => "configuring",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    /// No further automatic phase execution happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    /// Only failed or cancelled deployments may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeploymentStatus::Failed | DeploymentStatus::Cancelled)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
