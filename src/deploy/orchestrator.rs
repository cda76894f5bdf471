// ABOUTME: Runs deployment pipelines end to end and disposes their log buffers.
// ABOUTME: Entry points for fresh deployments and redeployments onto existing hosts.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::logs::{BufferHandle, DeploymentLog, LogRegistry, RunClaim};
use crate::model::{DeploymentRecord, DeploymentStatus, Project};
use crate::store::StoreError;
use crate::types::{AccessToken, DeploymentId};

use super::pipeline::{Collaborators, Pipeline, RunInputs, RunReport};
use super::state::{Pending, Reachable};

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// How long a finished run's buffer stays readable for late subscribers.
    pub grace_period: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Drives deployments through their phases.
///
/// Cheap to clone; every clone shares the same collaborators and registry.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    deps: Collaborators,
    registry: Arc<LogRegistry>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        deps: Collaborators,
        registry: Arc<LogRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            deps,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<LogRegistry> {
        &self.registry
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Run a PENDING deployment through provisioning, readiness, configure,
    /// build and deploy.
    ///
    /// Returns `None` when the run was skipped because the record is missing,
    /// not PENDING, or already being run.
    pub async fn execute(
        &self,
        id: &DeploymentId,
        project: Project,
        token: Option<AccessToken>,
        branch: String,
    ) -> Option<RunReport> {
        let claim = self.claim(id)?;
        self.execute_claimed(claim, project, token, branch).await
    }

    /// [`Orchestrator::execute`] for a caller that already holds the claim.
    pub async fn execute_claimed(
        &self,
        claim: RunClaim,
        project: Project,
        token: Option<AccessToken>,
        branch: String,
    ) -> Option<RunReport> {
        let record = self.load_pending(claim.deployment_id()).await?;
        let inputs = RunInputs {
            project,
            branch,
            token,
        };
        let (mut pipeline, buffer) = self.start(record, inputs);
        pipeline.announce("Starting deployment pipeline").await;

        let store = self.deps.store.as_ref();
        let report = match pipeline.provision(&self.deps).await {
            Err((p, e)) => p.fail(store, e).await,
            Ok(p) => match p.await_readiness(&self.deps).await {
                Err((p, e)) => p.fail(store, e).await,
                Ok(p) => self.finish(p).await,
            },
        };

        self.dispose_later(buffer);
        Some(report)
    }

    /// Run configure, build and deploy for `id` on the host recorded for
    /// `existing`. Provisioning and probing are skipped.
    pub async fn execute_redeployment(
        &self,
        id: &DeploymentId,
        project: Project,
        token: Option<AccessToken>,
        existing: &DeploymentId,
    ) -> Option<RunReport> {
        let _claim = self.claim(id)?;
        let mut record = self.load_pending(id).await?;
        if record.public_ip.is_none()
            && let Ok(source) = self.deps.store.get_deployment(existing).await
        {
            record.public_ip = source.public_ip;
            record.instance_id = source.instance_id;
            record.private_ip = source.private_ip;
        }

        let inputs = RunInputs {
            branch: record.branch.clone(),
            project,
            token,
        };
        let (mut pipeline, buffer) = self.start(record, inputs);
        pipeline.announce("Starting redeployment pipeline").await;

        let store = self.deps.store.as_ref();
        let report = match pipeline.reuse_host(existing).await {
            Err((p, e)) => p.fail(store, e).await,
            Ok(p) => self.finish(p).await,
        };

        self.dispose_later(buffer);
        Some(report)
    }

    /// Spawn [`Orchestrator::execute`] on the runtime without waiting.
    pub fn spawn(
        &self,
        id: DeploymentId,
        project: Project,
        token: Option<AccessToken>,
        branch: String,
    ) -> JoinHandle<Option<RunReport>> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.execute(&id, project, token, branch).await })
    }

    /// Spawn [`Orchestrator::execute_claimed`] on the runtime.
    pub fn spawn_claimed(
        &self,
        claim: RunClaim,
        project: Project,
        token: Option<AccessToken>,
        branch: String,
    ) -> JoinHandle<Option<RunReport>> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .execute_claimed(claim, project, token, branch)
                .await
        })
    }

    /// Spawn [`Orchestrator::execute_redeployment`] on the runtime.
    pub fn spawn_redeployment(
        &self,
        id: DeploymentId,
        project: Project,
        token: Option<AccessToken>,
        existing: DeploymentId,
    ) -> JoinHandle<Option<RunReport>> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .execute_redeployment(&id, project, token, &existing)
                .await
        })
    }

    fn claim(&self, id: &DeploymentId) -> Option<RunClaim> {
        let claim = self.registry.claim(id);
        if claim.is_none() {
            tracing::warn!(deployment_id = %id, "deployment is already running, skipping run");
        }
        claim
    }

    async fn load_pending(&self, id: &DeploymentId) -> Option<DeploymentRecord> {
        match self.deps.store.get_deployment(id).await {
            Ok(record) if record.status == DeploymentStatus::Pending => Some(record),
            Ok(record) => {
                tracing::warn!(
                    deployment_id = %id,
                    status = %record.status,
                    "deployment is not pending, skipping run"
                );
                None
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(deployment_id = %id, "deployment not found, skipping run");
                None
            }
            Err(e) => {
                tracing::warn!(deployment_id = %id, error = %e, "could not load deployment, skipping run");
                None
            }
        }
    }

    fn start(&self, record: DeploymentRecord, inputs: RunInputs) -> (Pipeline<Pending>, BufferHandle) {
        let buffer = self.registry.open(&record.id);
        let log = DeploymentLog::new(Arc::clone(&self.deps.store), buffer.clone());
        (Pipeline::new(record, log, inputs), buffer)
    }

    async fn finish(&self, pipeline: Pipeline<Reachable>) -> RunReport {
        let store = self.deps.store.as_ref();
        let pipeline = match pipeline.configure(&self.deps).await {
            Ok(p) => p,
            Err((p, e)) => return p.fail(store, e).await,
        };
        let pipeline = match pipeline.build(&self.deps).await {
            Ok(p) => p,
            Err((p, e)) => return p.fail(store, e).await,
        };
        let pipeline = match pipeline.deploy(&self.deps).await {
            Ok(p) => p,
            Err((p, e)) => return p.fail(store, e).await,
        };
        match pipeline.complete(&self.deps).await {
            Ok(report) => report,
            Err((p, e)) => p.fail(store, e).await,
        }
    }

    /// Drop the run's buffer once the grace period has passed. A newer run of
    /// the same deployment keeps its own buffer.
    fn dispose_later(&self, buffer: BufferHandle) {
        let registry = Arc::clone(&self.registry);
        let grace = self.settings.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !registry.dispose(&buffer) {
                tracing::debug!(
                    deployment_id = %buffer.deployment_id(),
                    "log buffer was reopened by a newer run, leaving it"
                );
            }
        });
    }
}
