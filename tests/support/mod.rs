// ABOUTME: Test support utilities.
// ABOUTME: Fake collaborators, a flaky store, and a harness wiring them into a service.

#![allow(dead_code)]

use async_trait::async_trait;
use cloudship::configure::{AppTarget, ConfigureError, Configurator, Task};
use cloudship::deploy::{Collaborators, Orchestrator, OrchestratorSettings};
use cloudship::logs::{LogRegistry, LogSink, StreamSettings};
use cloudship::model::{DeploymentRecord, DeploymentStatus, InstanceRecord, NewDeployment, Project};
use cloudship::probe::{ProbePolicy, ReadinessProber};
use cloudship::provision::{ProvisionError, ProvisionRequest, ProvisionedInstance, Provisioner};
use cloudship::service::{DeploymentService, ServiceSettings};
use cloudship::store::{DeploymentFilter, DeploymentStore, MemoryStore, StoreError};
use cloudship::types::{CloudProvider, DeploymentId, InstanceId, ProjectId, Sizing};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("cloudship=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn project() -> Project {
    Project {
        id: ProjectId::new("shop"),
        name: "shop".to_string(),
        repo_full_name: "acme/shop".to_string(),
        framework: "nextjs".to_string(),
    }
}

pub fn new_deployment() -> NewDeployment {
    let mut env_vars = BTreeMap::new();
    env_vars.insert("NODE_ENV".to_string(), "production".to_string());
    NewDeployment {
        project_id: ProjectId::new("shop"),
        provider: CloudProvider::Aws,
        region: "us-east-1".to_string(),
        sizing: Sizing::new("t3.small", "2GB"),
        branch: "main".to_string(),
        env_vars,
    }
}

// =============================================================================
// Provisioner
// =============================================================================

/// Returns a fixed address. Can fail the first N calls and hold later calls
/// until released.
#[derive(Default)]
pub struct FakeProvisioner {
    pub public_ip: Mutex<String>,
    pub calls: AtomicUsize,
    pub destroyed: Mutex<Vec<DeploymentId>>,
    fail_first: AtomicUsize,
    hold: AtomicBool,
    release: Notify,
}

impl FakeProvisioner {
    pub fn new(public_ip: &str) -> Self {
        Self {
            public_ip: Mutex::new(public_ip.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Make every later call wait for [`FakeProvisioner::release`].
    pub fn hold_calls(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(ProvisionError::InvalidOutput(
                "quota exceeded for instance type".to_string(),
            ));
        }

        while self.hold.load(Ordering::SeqCst) {
            let released = self.release.notified();
            if !self.hold.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        Ok(ProvisionedInstance {
            instance_id: InstanceId::new(format!("i-{}", request.deployment_id)),
            instance_type: request.provider.instance_type_for(&request.sizing),
            public_ip: self.public_ip.lock().clone(),
            private_ip: Some("172.31.0.10".to_string()),
            provisioning_state: serde_json::json!({"version": 4}),
        })
    }

    async fn destroy(&self, deployment_id: &DeploymentId) -> Result<(), ProvisionError> {
        self.destroyed.lock().push(deployment_id.clone());
        Ok(())
    }
}

// =============================================================================
// Configurator
// =============================================================================

/// Records every task it runs. Emits one progress line per task.
#[derive(Default)]
pub struct FakeConfigurator {
    pub seen: Mutex<Vec<(Task, String)>>,
    fail: Mutex<Option<Task>>,
    extra_line: Mutex<Option<String>>,
}

impl FakeConfigurator {
    pub fn failing(task: Task) -> Self {
        let configurator = Self::default();
        *configurator.fail.lock() = Some(task);
        configurator
    }

    /// Emit `line` through the sink during the configure task.
    pub fn with_configure_line(self, line: &str) -> Self {
        *self.extra_line.lock() = Some(line.to_string());
        self
    }

    pub fn hosts(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, host)| host.clone()).collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.seen.lock().iter().map(|(task, _)| *task).collect()
    }

    fn run(&self, task: Task, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError> {
        self.seen.lock().push((task, target.host.clone()));
        sink.debug(format!(
            "Ansible: TASK [{task}] ok: [{}] branch={}",
            target.host, target.branch
        ));
        if task == Task::Configure
            && let Some(line) = self.extra_line.lock().clone()
        {
            sink.debug(line);
        }
        if *self.fail.lock() == Some(task) {
            return Err(ConfigureError::Rejected(format!(
                "{} failed after 3 attempts",
                task.label()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Configurator for FakeConfigurator {
    async fn configure(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError> {
        self.run(Task::Configure, target, sink)
    }

    async fn build(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError> {
        self.run(Task::Build, target, sink)
    }

    async fn deploy(&self, target: &AppTarget, sink: &LogSink) -> Result<String, ConfigureError> {
        self.run(Task::Deploy, target, sink)?;
        Ok(format!("http://{}", target.host))
    }
}

// =============================================================================
// Store
// =============================================================================

/// A memory store whose deployment saves fail while the newest log line
/// contains a marker, or while the record carries a given status. Every
/// status that reaches the inner store is recorded.
pub struct FlakyStore {
    inner: MemoryStore,
    marker: Option<String>,
    rejected_status: Option<DeploymentStatus>,
    pub failed_saves: AtomicUsize,
    pub persisted: Mutex<Vec<DeploymentStatus>>,
}

impl FlakyStore {
    fn new(marker: Option<String>, rejected_status: Option<DeploymentStatus>) -> Self {
        Self {
            inner: MemoryStore::new(),
            marker,
            rejected_status,
            failed_saves: AtomicUsize::new(0),
            persisted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self::new(Some(marker.to_string()), None)
    }

    pub fn rejecting_status(status: DeploymentStatus) -> Self {
        Self::new(None, Some(status))
    }

    fn rejects(&self, record: &DeploymentRecord) -> bool {
        let last_line = record.logs.lines().last().unwrap_or_default();
        let by_marker = self
            .marker
            .as_deref()
            .is_some_and(|marker| last_line.contains(marker));
        by_marker || self.rejected_status == Some(record.status)
    }
}

#[async_trait]
impl DeploymentStore for FlakyStore {
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        self.inner.get_deployment(id).await
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        if self.rejects(record) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.persisted.lock().push(record.status);
        self.inner.save_deployment(record).await
    }

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.inner.query_deployments(filter).await
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError> {
        self.inner.delete_deployment(id).await
    }

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        self.inner.save_instance(record).await
    }

    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        self.inner.get_instance(deployment_id).await
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Probe settings small enough for tests to run in real time.
pub fn fast_probe() -> ProbePolicy {
    ProbePolicy {
        max_attempts: 2,
        timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_millis(200),
        early_delay: Duration::from_millis(10),
        ..ProbePolicy::default()
    }
}

pub fn fast_stream() -> StreamSettings {
    StreamSettings {
        poll_interval: Duration::from_millis(20),
        read_timeout: Duration::from_millis(500),
        max_consecutive_errors: 3,
    }
}

pub struct Harness {
    pub service: DeploymentService,
    pub store: Arc<dyn DeploymentStore>,
    pub registry: Arc<LogRegistry>,
    pub provisioner: Arc<FakeProvisioner>,
    pub configurator: Arc<FakeConfigurator>,
    /// Keeps the probed port open for the lifetime of the harness.
    _listener: Option<TcpListener>,
}

pub struct HarnessBuilder {
    store: Arc<dyn DeploymentStore>,
    provisioner: FakeProvisioner,
    configurator: FakeConfigurator,
    port_open: bool,
    grace_period: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            provisioner: FakeProvisioner::new("127.0.0.1"),
            configurator: FakeConfigurator::default(),
            port_open: true,
            grace_period: Duration::from_millis(50),
        }
    }

    pub fn store(mut self, store: Arc<dyn DeploymentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn provisioner(mut self, provisioner: FakeProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn configurator(mut self, configurator: FakeConfigurator) -> Self {
        self.configurator = configurator;
        self
    }

    /// Probe a port nobody listens on.
    pub fn port_closed(mut self) -> Self {
        self.port_open = false;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub async fn build(self) -> Harness {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let listener = if self.port_open {
            Some(listener)
        } else {
            drop(listener);
            None
        };

        let provisioner = Arc::new(self.provisioner);
        let configurator = Arc::new(self.configurator);
        let registry = Arc::new(LogRegistry::new());
        let deps = Collaborators {
            store: Arc::clone(&self.store),
            provisioner: provisioner.clone(),
            configurator: configurator.clone(),
            prober: ReadinessProber::new(fast_probe()),
            ssh_port: port,
            probe_timeout: Duration::from_secs(2),
        };
        let orchestrator = Orchestrator::new(
            deps,
            Arc::clone(&registry),
            OrchestratorSettings {
                grace_period: self.grace_period,
            },
        );
        let service = DeploymentService::new(
            orchestrator,
            ServiceSettings {
                read_timeout: Duration::from_secs(1),
                stream: fast_stream(),
            },
        );

        Harness {
            service,
            store: self.store,
            registry,
            provisioner,
            configurator,
            _listener: listener,
        }
    }
}

/// Poll `check` every 10ms for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
