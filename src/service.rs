// ABOUTME: Caller-facing deployment operations: start, retry, redeploy, cancel, and reads.
// ABOUTME: Validates requests against stored state and spawns orchestrator runs.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::deploy::{Orchestrator, RunReport};
use crate::logs::{LogLevel, LogStream, StreamSettings, format_line, subscribe};
use crate::model::{DeploymentRecord, DeploymentStatus, NewDeployment, Project};
use crate::store::{DeploymentFilter, DeploymentStore, StoreError, TimedStore};
use crate::types::{AccessToken, DeploymentId};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    #[error("timed out reading deployment {0}")]
    TimedOut(DeploymentId),

    #[error("deployment {id} is {status}; only failed or cancelled deployments can be retried")]
    NotRetryable {
        id: DeploymentId,
        status: DeploymentStatus,
    },

    #[error("deployment {id} already finished with status {status}")]
    AlreadyTerminal {
        id: DeploymentId,
        status: DeploymentStatus,
    },

    #[error("deployment {0} is already running in this process")]
    DeploymentActive(DeploymentId),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    fn from_store(id: &DeploymentId, e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ServiceError::NotFound(id.clone()),
            StoreError::TimedOut { .. } => ServiceError::TimedOut(id.clone()),
            other => ServiceError::Store(other),
        }
    }
}

/// Point-in-time view of a deployment's log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogsSnapshot {
    pub logs: String,
    pub status: DeploymentStatus,
    pub completed: bool,
    pub public_url: Option<String>,
}

/// Timeouts and stream behaviour for read operations.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Bound on status and log reads.
    pub read_timeout: Duration,
    pub stream: StreamSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            stream: StreamSettings::default(),
        }
    }
}

/// A run that has been started in the background.
#[derive(Debug)]
pub struct Started {
    pub record: DeploymentRecord,
    pub handle: JoinHandle<Option<RunReport>>,
}

#[derive(Clone)]
pub struct DeploymentService {
    store: Arc<dyn DeploymentStore>,
    /// Same store, with every caller-facing read bounded by `read_timeout`.
    reads: TimedStore,
    orchestrator: Orchestrator,
    settings: ServiceSettings,
}

impl std::fmt::Debug for DeploymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentService")
            .field("orchestrator", &self.orchestrator)
            .field("settings", &self.settings)
            .finish()
    }
}

impl DeploymentService {
    pub fn new(orchestrator: Orchestrator, settings: ServiceSettings) -> Self {
        let store = Arc::clone(&orchestrator.collaborators().store);
        Self {
            reads: TimedStore::new(Arc::clone(&store), settings.read_timeout),
            store,
            orchestrator,
            settings,
        }
    }

    /// Create a PENDING deployment and run it in the background.
    pub async fn start(
        &self,
        project: Project,
        input: NewDeployment,
        token: Option<AccessToken>,
    ) -> Result<Started, ServiceError> {
        let record = DeploymentRecord::new(input);
        self.store
            .save_deployment(&record)
            .await
            .map_err(|e| ServiceError::from_store(&record.id, e))?;
        tracing::info!(deployment_id = %record.id, project = %project.name, "deployment created");

        let handle =
            self.orchestrator
                .spawn(record.id.clone(), project, token, record.branch.clone());
        Ok(Started { record, handle })
    }

    /// Reset a failed or cancelled deployment and run it again from the top.
    pub async fn retry(
        &self,
        id: &DeploymentId,
        project: Project,
        token: Option<AccessToken>,
    ) -> Result<Started, ServiceError> {
        // Held from before the status check until the run ends.
        let claim = self
            .orchestrator
            .registry()
            .claim(id)
            .ok_or_else(|| ServiceError::DeploymentActive(id.clone()))?;
        let mut record = self.load(id).await?;
        if !record.status.is_retryable() {
            return Err(ServiceError::NotRetryable {
                id: id.clone(),
                status: record.status,
            });
        }

        record.reset_for_retry();
        record.logs.push_str(&format_line(
            Utc::now(),
            LogLevel::Info,
            "Deployment retry initiated",
        ));
        self.store
            .save_deployment(&record)
            .await
            .map_err(|e| ServiceError::from_store(id, e))?;
        tracing::info!(deployment_id = %id, "deployment retry initiated");

        let handle = self
            .orchestrator
            .spawn_claimed(claim, project, token, record.branch.clone());
        Ok(Started { record, handle })
    }

    /// Create a new deployment on the instance of `existing_id`.
    pub async fn redeploy(
        &self,
        existing_id: &DeploymentId,
        project: Project,
        token: Option<AccessToken>,
    ) -> Result<Started, ServiceError> {
        let existing = self.load(existing_id).await?;
        let record = DeploymentRecord::redeploy_from(&existing);
        self.store
            .save_deployment(&record)
            .await
            .map_err(|e| ServiceError::from_store(&record.id, e))?;
        tracing::info!(
            deployment_id = %record.id,
            source = %existing_id,
            "redeployment created"
        );

        let handle = self.orchestrator.spawn_redeployment(
            record.id.clone(),
            project,
            token,
            existing_id.clone(),
        );
        Ok(Started { record, handle })
    }

    /// Mark a stalled deployment CANCELLED. Runs in this process can't be
    /// interrupted.
    pub async fn cancel(&self, id: &DeploymentId) -> Result<DeploymentRecord, ServiceError> {
        let mut record = self.load(id).await?;
        if record.is_terminal() {
            return Err(ServiceError::AlreadyTerminal {
                id: id.clone(),
                status: record.status,
            });
        }
        let registry = self.orchestrator.registry();
        if registry.is_running(id) || registry.is_active(id) {
            return Err(ServiceError::DeploymentActive(id.clone()));
        }

        let now = Utc::now();
        record.status = DeploymentStatus::Cancelled;
        record.completed_at = Some(now);
        record.updated_at = now;
        record
            .logs
            .push_str(&format_line(now, LogLevel::Warn, "Deployment cancelled"));
        self.store
            .save_deployment(&record)
            .await
            .map_err(|e| ServiceError::from_store(id, e))?;
        tracing::info!(deployment_id = %id, "deployment cancelled");
        Ok(record)
    }

    pub async fn status(&self, id: &DeploymentId) -> Result<DeploymentRecord, ServiceError> {
        self.load(id).await
    }

    pub async fn logs(&self, id: &DeploymentId) -> Result<LogsSnapshot, ServiceError> {
        let record = self.load(id).await?;
        Ok(LogsSnapshot {
            completed: record.is_terminal(),
            logs: record.logs,
            status: record.status,
            public_url: record.public_url,
        })
    }

    /// Live log events for `id`. Fails up front if the deployment is unknown.
    pub async fn stream(&self, id: &DeploymentId) -> Result<LogStream, ServiceError> {
        self.load(id).await?;
        Ok(subscribe(
            id.clone(),
            Arc::clone(&self.store),
            Arc::clone(self.orchestrator.registry()),
            self.settings.stream.clone(),
        ))
    }

    pub async fn list(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, ServiceError> {
        self.reads
            .query_deployments(filter)
            .await
            .map_err(ServiceError::Store)
    }

    /// Tear down the deployment's infrastructure and mark its instance
    /// destroyed. Failures are logged; returns whether cleanup succeeded.
    pub async fn destroy(&self, id: &DeploymentId) -> bool {
        let provisioner = &self.orchestrator.collaborators().provisioner;
        if let Err(e) = provisioner.destroy(id).await {
            tracing::error!(deployment_id = %id, error = %e, "failed to destroy infrastructure");
            return false;
        }

        match self.store.get_instance(id).await {
            Ok(Some(mut instance)) => {
                instance.destroyed_at = Some(Utc::now());
                if let Err(e) = self.store.save_instance(&instance).await {
                    tracing::error!(deployment_id = %id, error = %e, "failed to mark instance destroyed");
                    return false;
                }
            }
            Ok(None) => {
                tracing::debug!(deployment_id = %id, "no instance recorded, nothing to mark");
            }
            Err(e) => {
                tracing::error!(deployment_id = %id, error = %e, "failed to load instance record");
                return false;
            }
        }

        tracing::info!(deployment_id = %id, "infrastructure destroyed");
        true
    }

    async fn load(&self, id: &DeploymentId) -> Result<DeploymentRecord, ServiceError> {
        self.reads
            .get_deployment(id)
            .await
            .map_err(|e| ServiceError::from_store(id, e))
    }
}
