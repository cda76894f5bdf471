// ABOUTME: The deployment record: inputs, machine state, results, and log.
// ABOUTME: Mutated only by the orchestrator once a run has started.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{CloudProvider, DeploymentId, InstanceId, ProjectId, Sizing};

use super::DeploymentStatus;

/// Caller-supplied inputs for a new deployment.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub project_id: ProjectId,
    pub provider: CloudProvider,
    pub region: String,
    pub sizing: Sizing,
    pub branch: String,
    pub env_vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub provider: CloudProvider,
    pub region: String,
    #[serde(flatten)]
    pub sizing: Sizing,
    pub branch: String,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    pub status: DeploymentStatus,

    pub instance_id: Option<InstanceId>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub public_url: Option<String>,
    pub deployment_time_seconds: Option<u64>,
    pub error_message: Option<String>,

    /// Authoritative, append-only history. One formatted line per event.
    #[serde(default)]
    pub logs: String,

    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// Create a fresh PENDING record.
    pub fn new(input: NewDeployment) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            project_id: input.project_id,
            provider: input.provider,
            region: input.region,
            sizing: input.sizing,
            branch: input.branch,
            env_vars: input.env_vars,
            status: DeploymentStatus::Pending,
            instance_id: None,
            public_ip: None,
            private_ip: None,
            public_url: None,
            deployment_time_seconds: None,
            error_message: None,
            logs: String::new(),
            created_at: now,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Create a PENDING record that reuses the infrastructure of `existing`.
    ///
    /// Inputs are copied and the instance id and public address are carried
    /// over verbatim; no provisioning happens for the new record.
    pub fn redeploy_from(existing: &DeploymentRecord) -> Self {
        let mut record = Self::new(NewDeployment {
            project_id: existing.project_id.clone(),
            provider: existing.provider,
            region: existing.region.clone(),
            sizing: existing.sizing.clone(),
            branch: existing.branch.clone(),
            env_vars: existing.env_vars.clone(),
        });
        record.instance_id = existing.instance_id.clone();
        record.public_ip = existing.public_ip.clone();
        record.private_ip = existing.private_ip.clone();
        record
    }

    /// Put a failed or cancelled record back into PENDING for a fresh run.
    ///
    /// The log is kept; callers append a marker line after resetting.
    pub fn reset_for_retry(&mut self) {
        let now = Utc::now();
        self.status = DeploymentStatus::Pending;
        self.error_message = None;
        self.completed_at = None;
        self.public_url = None;
        self.deployment_time_seconds = None;
        self.started_at = now;
        self.updated_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
