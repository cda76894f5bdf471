// ABOUTME: Per-operation timeouts for any store.
// ABOUTME: Elapsed deadlines surface as StoreError::TimedOut.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::model::{DeploymentRecord, InstanceRecord};
use crate::types::DeploymentId;

use super::{DeploymentFilter, DeploymentStore, StoreError};

/// Run a store operation with a deadline.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::TimedOut { operation, after }),
    }
}

/// Wraps a store so that every operation is bounded by the same timeout.
///
/// Caller-facing reads go through this so a slow backend can't hang a
/// status check indefinitely.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn DeploymentStore>,
    timeout: Duration,
}

impl std::fmt::Debug for TimedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TimedStore {
    pub fn new(inner: Arc<dyn DeploymentStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl DeploymentStore for TimedStore {
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        with_timeout("get_deployment", self.timeout, self.inner.get_deployment(id)).await
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        with_timeout(
            "save_deployment",
            self.timeout,
            self.inner.save_deployment(record),
        )
        .await
    }

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        with_timeout(
            "query_deployments",
            self.timeout,
            self.inner.query_deployments(filter),
        )
        .await
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError> {
        with_timeout(
            "delete_deployment",
            self.timeout,
            self.inner.delete_deployment(id),
        )
        .await
    }

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        with_timeout("save_instance", self.timeout, self.inner.save_instance(record)).await
    }

    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        with_timeout(
            "get_instance",
            self.timeout,
            self.inner.get_instance(deployment_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;

    #[tokio::test(start_paused = true)]
    async fn elapsed_operation_is_a_timeout_not_a_miss() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let err = with_timeout("get_deployment", Duration::from_secs(5), slow)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::TimedOut);
        assert!(err.to_string().contains("get_deployment"));
    }

    #[tokio::test]
    async fn fast_operation_passes_result_through() {
        let value = with_timeout("noop", Duration::from_secs(1), async {
            Ok::<_, StoreError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }
}
