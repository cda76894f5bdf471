// ABOUTME: Deployment pipeline parameterized by state marker, with its transitions.
// ABOUTME: Each transition consumes self, commits status, and returns the next state.

use chrono::Utc;
use snafu::ResultExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::configure::{AppTarget, Configurator, Task};
use crate::diagnostics::{Diagnostics, Warning};
use crate::logs::{DeploymentLog, LogLevel, LogReceiver, LogSink};
use crate::model::{DeploymentRecord, DeploymentStatus, InstanceRecord, Project};
use crate::probe::{ProbeOutcome, ReadinessProber};
use crate::provision::{ProvisionRequest, Provisioner};
use crate::store::DeploymentStore;
use crate::types::{AccessToken, DeploymentId};

use super::error::{
    ConfigureSnafu, InstanceRecordSnafu, PhaseError, ProvisionSnafu, ReadinessSnafu,
    StatusCommitSnafu,
};
use super::state::{Built, Configured, Deployed, Pending, Provisioned, Reachable};

/// Result type for transitions: the failed pipeline comes back with the
/// error so the caller can route it to FAILED.
pub type TransitionResult<T, S> = Result<Pipeline<T>, (Pipeline<S>, PhaseError)>;

/// Everything the phases call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DeploymentStore>,
    pub provisioner: Arc<dyn Provisioner>,
    pub configurator: Arc<dyn Configurator>,
    pub prober: ReadinessProber,
    /// Administrative port probed after provisioning.
    pub ssh_port: u16,
    pub probe_timeout: Duration,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("prober", &self.prober)
            .field("ssh_port", &self.ssh_port)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

/// Inputs fixed for the whole run.
#[derive(Debug, Clone)]
pub(crate) struct RunInputs {
    pub project: Project,
    pub branch: String,
    pub token: Option<AccessToken>,
}

/// The final status of a run plus anything worth telling the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub deployment_id: DeploymentId,
    pub status: DeploymentStatus,
    pub public_url: Option<String>,
    pub error_message: Option<String>,
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == DeploymentStatus::Success
    }
}

/// A deployment run in progress, parameterized by its current state.
///
/// Owns the record for the duration of the run, so this pipeline is the
/// record's only writer.
pub struct Pipeline<S> {
    record: DeploymentRecord,
    log: DeploymentLog,
    inputs: RunInputs,
    diagnostics: Diagnostics,
    state: S,
}

impl<S> std::fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("deployment_id", &self.record.id)
            .field("status", &self.record.status)
            .finish()
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

impl<S> Pipeline<S> {
    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    fn transition<T>(self, state: T) -> Pipeline<T> {
        Pipeline {
            record: self.record,
            log: self.log,
            inputs: self.inputs,
            diagnostics: self.diagnostics,
            state,
        }
    }

    async fn info(&mut self, message: &str) {
        self.log.info(&mut self.record, message).await;
    }

    async fn debug(&mut self, message: &str) {
        self.log.debug(&mut self.record, message).await;
    }

    /// Commit a status change, then log it. A failed commit restores the
    /// previous status, is returned, and logs nothing.
    async fn set_status(
        &mut self,
        store: &dyn DeploymentStore,
        status: DeploymentStatus,
    ) -> Result<(), PhaseError> {
        let previous = (self.record.status, self.record.updated_at);
        self.record.status = status;
        self.record.updated_at = Utc::now();
        if let Err(e) = store.save_deployment(&self.record).await {
            (self.record.status, self.record.updated_at) = previous;
            return Err(e).context(StatusCommitSnafu { status });
        }
        tracing::info!(deployment_id = %self.record.id, %status, "status changed");
        self.info(&format!("Status updated to: {status}")).await;
        Ok(())
    }

    /// Drive `work` to completion while copying every message it sends
    /// through the sink into the deployment log.
    async fn drained<F>(&mut self, mut rx: LogReceiver, work: F) -> F::Output
    where
        F: Future,
    {
        tokio::pin!(work);
        let output = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => {
                    self.log.append(&mut self.record, event.level, &event.message).await;
                }
                output = &mut work => break output,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.log
                .append(&mut self.record, event.level, &event.message)
                .await;
        }
        output
    }

    fn target(&self, host: &str) -> AppTarget {
        AppTarget {
            host: host.to_string(),
            repo_url: self.inputs.project.repo_url(),
            branch: self.inputs.branch.clone(),
            framework: self.inputs.project.framework.clone(),
            env_vars: self.record.env_vars.clone(),
            access_token: self.inputs.token.clone(),
        }
    }

    async fn run_task(
        &mut self,
        deps: &Collaborators,
        task: Task,
        host: &str,
    ) -> Result<Option<String>, PhaseError> {
        let target = self.target(host);
        let (sink, rx) = LogSink::channel();
        let configurator = Arc::clone(&deps.configurator);
        let work = async move {
            match task {
                Task::Configure => configurator.configure(&target, &sink).await.map(|_| None),
                Task::Build => configurator.build(&target, &sink).await.map(|_| None),
                Task::Deploy => configurator.deploy(&target, &sink).await.map(Some),
            }
        };
        self.drained(rx, work).await.context(ConfigureSnafu { task })
    }

    /// Route an error to FAILED and finish the run.
    pub async fn fail(mut self, store: &dyn DeploymentStore, error: PhaseError) -> RunReport {
        let message = error.to_string();
        tracing::error!(deployment_id = %self.record.id, kind = ?error.kind(), "deployment failed: {message}");

        self.log
            .append(
                &mut self.record,
                LogLevel::Error,
                &format!("Deployment failed: {message}"),
            )
            .await;
        self.record.error_message = Some(message);
        self.record.completed_at = Some(Utc::now());

        if let Err(e) = self.set_status(store, DeploymentStatus::Failed).await {
            self.info("Status updated to: failed").await;
            self.diagnostics
                .warn(Warning::status_commit(format!("could not store FAILED status: {e}")));
        }
        self.into_report()
    }

    fn into_report(mut self) -> RunReport {
        let lost = self.log.persistence_failures();
        if lost > 0 {
            self.diagnostics.warn(Warning::log_persistence(format!(
                "{lost} log line(s) could not be persisted"
            )));
        }
        RunReport {
            deployment_id: self.record.id.clone(),
            status: self.record.status,
            public_url: self.record.public_url.clone(),
            error_message: self.record.error_message.clone(),
            warnings: self.diagnostics.into_warnings(),
        }
    }
}

// =============================================================================
// Pending -> Provisioned | Reachable
// =============================================================================

impl Pipeline<Pending> {
    pub(crate) fn new(record: DeploymentRecord, log: DeploymentLog, inputs: RunInputs) -> Self {
        Pipeline {
            record,
            log,
            inputs,
            diagnostics: Diagnostics::default(),
            state: Pending,
        }
    }

    /// Log the run header.
    pub(crate) async fn announce(&mut self, headline: &str) {
        self.info(headline).await;
        let details = format!(
            "Deployment details: Project: {}, Branch: {}, Provider: {}, Region: {}",
            self.inputs.project.name, self.inputs.branch, self.record.provider, self.record.region
        );
        self.debug(&details).await;
    }

    /// Create the instance and record its identity.
    pub async fn provision(mut self, deps: &Collaborators) -> TransitionResult<Provisioned, Pending> {
        let provider = self.record.provider.as_str().to_uppercase();
        self.info(&format!("Provisioning {provider} infrastructure..."))
            .await;
        if let Err(e) = self
            .set_status(deps.store.as_ref(), DeploymentStatus::Provisioning)
            .await
        {
            return Err((self, e));
        }

        let request = ProvisionRequest {
            deployment_id: self.record.id.clone(),
            provider: self.record.provider,
            region: self.record.region.clone(),
            sizing: self.record.sizing.clone(),
        };
        let instance = match deps
            .provisioner
            .provision(&request)
            .await
            .context(ProvisionSnafu)
        {
            Ok(instance) => instance,
            Err(e) => return Err((self, e)),
        };

        let instance_record = InstanceRecord {
            deployment_id: self.record.id.clone(),
            instance_id: instance.instance_id.clone(),
            instance_type: instance.instance_type.clone(),
            public_ip: instance.public_ip.clone(),
            private_ip: instance.private_ip.clone(),
            provisioning_state: instance.provisioning_state,
            created_at: Utc::now(),
            destroyed_at: None,
        };
        if let Err(e) = deps
            .store
            .save_instance(&instance_record)
            .await
            .context(InstanceRecordSnafu)
        {
            return Err((self, e));
        }

        self.record.instance_id = Some(instance.instance_id.clone());
        self.record.public_ip = Some(instance.public_ip.clone());
        self.record.private_ip = instance.private_ip.clone();
        self.record.updated_at = Utc::now();

        self.info(&format!(
            "Infrastructure provisioned: {}",
            instance.instance_id
        ))
        .await;
        self.info(&format!("Public IP: {}", instance.public_ip)).await;
        self.debug(&format!(
            "Instance details: Instance Type: {}, Private IP: {}",
            instance.instance_type,
            instance.private_ip.as_deref().unwrap_or("N/A")
        ))
        .await;

        Ok(self.transition(Provisioned {
            host: instance.public_ip,
        }))
    }

    /// Skip provisioning and probing: the record already points at a host.
    pub async fn reuse_host(mut self, existing: &DeploymentId) -> TransitionResult<Reachable, Pending> {
        match self.record.public_ip.clone() {
            Some(host) => {
                self.info(&format!("Reusing existing instance at {host}"))
                    .await;
                Ok(self.transition(Reachable { host }))
            }
            None => {
                let existing = existing.clone();
                Err((self, PhaseError::NoHost { existing }))
            }
        }
    }
}

// =============================================================================
// Provisioned -> Reachable
// =============================================================================

impl Pipeline<Provisioned> {
    /// Wait for the administrative port. An inconclusive probe is a warning,
    /// not a failure.
    pub async fn await_readiness(
        mut self,
        deps: &Collaborators,
    ) -> TransitionResult<Reachable, Provisioned> {
        self.info("Waiting for instance to be ready...").await;

        let host = self.state.host.clone();
        let (sink, rx) = LogSink::channel();
        let prober = deps.prober.clone();
        let (port, timeout) = (deps.ssh_port, deps.probe_timeout);
        let probe_host = host.clone();
        let work = async move {
            prober
                .wait_until_reachable(&probe_host, port, timeout, &sink)
                .await
        };

        match self.drained(rx, work).await.context(ReadinessSnafu) {
            Ok(ProbeOutcome::Confirmed { .. }) => {}
            Ok(ProbeOutcome::Unconfirmed { attempts, elapsed }) => {
                self.diagnostics.warn(Warning::readiness_unconfirmed(format!(
                    "SSH readiness on {host} unconfirmed after {attempts} attempts in {}s",
                    elapsed.as_secs()
                )));
            }
            Err(e) => return Err((self, e)),
        }

        Ok(self.transition(Reachable { host }))
    }
}

// =============================================================================
// Reachable -> Configured -> Built -> Deployed
// =============================================================================

impl Pipeline<Reachable> {
    pub async fn configure(mut self, deps: &Collaborators) -> TransitionResult<Configured, Reachable> {
        self.info("Configuring instance...").await;
        if let Err(e) = self
            .set_status(deps.store.as_ref(), DeploymentStatus::Configuring)
            .await
        {
            return Err((self, e));
        }

        let host = self.state.host.clone();
        if let Err(e) = self.run_task(deps, Task::Configure, &host).await {
            return Err((self, e));
        }
        self.info("Instance configured successfully").await;
        Ok(self.transition(Configured { host }))
    }
}

impl Pipeline<Configured> {
    pub async fn build(mut self, deps: &Collaborators) -> TransitionResult<Built, Configured> {
        self.info("Building application...").await;
        if let Err(e) = self
            .set_status(deps.store.as_ref(), DeploymentStatus::Building)
            .await
        {
            return Err((self, e));
        }

        let host = self.state.host.clone();
        if let Err(e) = self.run_task(deps, Task::Build, &host).await {
            return Err((self, e));
        }
        self.info("Application built successfully").await;
        Ok(self.transition(Built { host }))
    }
}

impl Pipeline<Built> {
    pub async fn deploy(mut self, deps: &Collaborators) -> TransitionResult<Deployed, Built> {
        self.info("Deploying application...").await;
        if let Err(e) = self
            .set_status(deps.store.as_ref(), DeploymentStatus::Deploying)
            .await
        {
            return Err((self, e));
        }

        let host = self.state.host.clone();
        let url = match self.run_task(deps, Task::Deploy, &host).await {
            Ok(url) => url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| format!("http://{host}")),
            Err(e) => return Err((self, e)),
        };

        self.record.public_url = Some(url.clone());
        self.info(&format!("Application deployed: {url}")).await;
        Ok(self.transition(Deployed { url }))
    }
}

// =============================================================================
// Deployed -> SUCCESS
// =============================================================================

impl Pipeline<Deployed> {
    /// Stamp timing and commit SUCCESS.
    pub async fn complete(
        mut self,
        deps: &Collaborators,
    ) -> Result<RunReport, (Pipeline<Deployed>, PhaseError)> {
        let completed_at = Utc::now();
        let elapsed = (completed_at - self.record.started_at).num_seconds().max(0) as u64;
        self.record.completed_at = Some(completed_at);
        self.record.deployment_time_seconds = Some(elapsed);

        if let Err(e) = self
            .set_status(deps.store.as_ref(), DeploymentStatus::Success)
            .await
        {
            self.record.completed_at = None;
            self.record.deployment_time_seconds = None;
            return Err((self, e));
        }

        self.log
            .append(
                &mut self.record,
                LogLevel::Success,
                &format!("Deployment completed in {elapsed} seconds!"),
            )
            .await;
        Ok(self.into_report())
    }
}
