// ABOUTME: Phase error types with SNAFU pattern.
// ABOUTME: One variant per pipeline phase, each wrapping its collaborator's error.

use snafu::Snafu;

use crate::configure::{ConfigureError, Task};
use crate::model::DeploymentStatus;
use crate::probe::ProbeError;
use crate::provision::ProvisionError;
use crate::store::StoreError;
use crate::types::DeploymentId;

/// Why a deployment ended in FAILED.
///
/// The display text is what lands in the record's `error_message`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PhaseError {
    #[snafu(display("{source}"))]
    Provision { source: ProvisionError },

    #[snafu(display("{source}"))]
    Readiness { source: ProbeError },

    #[snafu(display("{source}"))]
    Configure { task: Task, source: ConfigureError },

    #[snafu(display("failed to record status '{status}': {source}"))]
    StatusCommit {
        status: DeploymentStatus,
        source: StoreError,
    },

    #[snafu(display("failed to record provisioned instance: {source}"))]
    InstanceRecord { source: StoreError },

    #[snafu(display("deployment {existing} has no public IP to redeploy onto"))]
    NoHost { existing: DeploymentId },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseErrorKind {
    Provisioning,
    Readiness,
    Configuring,
    Building,
    Deploying,
    Persistence,
    MissingHost,
}

impl PhaseError {
    pub fn kind(&self) -> PhaseErrorKind {
        match self {
            PhaseError::Provision { .. } => PhaseErrorKind::Provisioning,
            PhaseError::Readiness { .. } => PhaseErrorKind::Readiness,
            PhaseError::Configure { task, .. } => match task {
                Task::Configure => PhaseErrorKind::Configuring,
                Task::Build => PhaseErrorKind::Building,
                Task::Deploy => PhaseErrorKind::Deploying,
            },
            PhaseError::StatusCommit { .. } | PhaseError::InstanceRecord { .. } => {
                PhaseErrorKind::Persistence
            }
            PhaseError::NoHost { .. } => PhaseErrorKind::MissingHost,
        }
    }
}
