// ABOUTME: Keyed record store for deployments and instances.
// ABOUTME: Defines the store trait, query filters, and the timeout wrapper.

mod error;
mod file;
mod memory;
mod timed;

pub use error::{StoreError, StoreErrorKind};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use timed::{TimedStore, with_timeout};

use async_trait::async_trait;

use crate::model::{DeploymentRecord, DeploymentStatus, InstanceRecord};
use crate::types::{DeploymentId, ProjectId};

/// Filters for [`DeploymentStore::query_deployments`]. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub project_id: Option<ProjectId>,
    pub status: Option<DeploymentStatus>,
}

impl DeploymentFilter {
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            status: None,
        }
    }

    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        self.project_id
            .as_ref()
            .is_none_or(|id| *id == record.project_id)
            && self.status.is_none_or(|status| status == record.status)
    }
}

/// Persistence for deployment and instance records.
///
/// Records are whole documents: `save_*` replaces what was stored under the
/// same key. Queries return newest deployments first.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Fetch a deployment. Missing records are [`StoreError::NotFound`].
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError>;

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError>;

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError>;

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError>;

    /// Instance owned by a deployment, if provisioning ever succeeded.
    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError>;
}

pub(crate) fn sort_newest_first(records: &mut [DeploymentRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
