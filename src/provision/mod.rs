// ABOUTME: Infrastructure provisioning behind a trait, with a terraform implementation.
// ABOUTME: One compute instance per deployment, destroyed by deployment id.

mod error;
mod terraform;

pub use error::ProvisionError;
pub use terraform::{TerraformProvisioner, TerraformSettings};

use async_trait::async_trait;

use crate::types::{CloudProvider, DeploymentId, InstanceId, Sizing};

/// What to provision for one deployment.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub deployment_id: DeploymentId,
    pub provider: CloudProvider,
    pub region: String,
    pub sizing: Sizing,
}

/// Network identity of a freshly provisioned instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedInstance {
    pub instance_id: InstanceId,
    pub instance_type: String,
    pub public_ip: String,
    pub private_ip: Option<String>,
    /// Tool-specific state, stored verbatim on the instance record.
    pub provisioning_state: serde_json::Value,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the instance for `request.deployment_id`.
    ///
    /// Calling this again for the same deployment reuses that deployment's
    /// resource set.
    async fn provision(&self, request: &ProvisionRequest)
    -> Result<ProvisionedInstance, ProvisionError>;

    /// Tear down whatever was created for `deployment_id`. Succeeds when
    /// nothing was ever provisioned.
    async fn destroy(&self, deployment_id: &DeploymentId) -> Result<(), ProvisionError>;
}
