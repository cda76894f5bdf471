// ABOUTME: Record of provisioned infrastructure owned by a deployment.
// ABOUTME: Marked destroyed on cleanup rather than deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeploymentId, InstanceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub deployment_id: DeploymentId,
    pub instance_id: InstanceId,
    pub instance_type: String,
    pub public_ip: String,
    pub private_ip: Option<String>,
    /// Opaque provisioning-tool state blob.
    pub provisioning_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    pub fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }
}
