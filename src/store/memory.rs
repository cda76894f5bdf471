// ABOUTME: In-process store backed by hash maps.
// ABOUTME: Used by tests and by callers that don't need durability.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::model::{DeploymentRecord, InstanceRecord};
use crate::types::DeploymentId;

use super::{DeploymentFilter, DeploymentStore, StoreError, sort_newest_first};

#[derive(Debug, Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<DeploymentId, DeploymentRecord>>,
    instances: RwLock<HashMap<DeploymentId, InstanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        self.deployments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.deployments
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let mut records: Vec<_> = self
            .deployments
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError> {
        self.deployments
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        self.instances
            .write()
            .await
            .insert(record.deployment_id.clone(), record.clone());
        Ok(())
    }

    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.instances.read().await.get(deployment_id).cloned())
    }
}
