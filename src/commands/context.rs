// ABOUTME: Builds the deployment service and its collaborators from cloudship.yml.
// ABOUTME: Shared by every command that touches deployments.

use cloudship::config::Config;
use cloudship::configure::{AnsibleConfigurator, REPO_TOKEN_ENV};
use cloudship::deploy::{Collaborators, Orchestrator, OrchestratorSettings};
use cloudship::error::Result;
use cloudship::logs::LogRegistry;
use cloudship::model::Project;
use cloudship::probe::{ReadinessProber, SshHandshake};
use cloudship::provision::TerraformProvisioner;
use cloudship::service::{DeploymentService, ServiceSettings};
use cloudship::store::FileStore;
use cloudship::types::AccessToken;
use std::sync::Arc;

/// Everything a command needs: the service, the project it acts for, and
/// the repository token, if one is set.
pub struct Context {
    pub service: DeploymentService,
    pub config: Config,
    pub project: Project,
    pub token: Option<AccessToken>,
}

impl Context {
    pub async fn build(config: &Config) -> Result<Self> {
        let store = Arc::new(FileStore::open(config.store_path()).await?);

        let mut prober = ReadinessProber::new(config.probe.clone());
        if config.ssh.verify_login {
            let mut handshake = SshHandshake::new(&config.ssh.user)
                .trust_on_first_use(config.ssh.trust_first_connection)
                .connect_timeout(config.probe.handshake_timeout);
            if let Some(key) = config.ssh_key_path() {
                handshake = handshake.key_path(key);
            }
            if let Some(known_hosts) = config.known_hosts_path() {
                handshake = handshake.known_hosts_path(known_hosts);
            }
            prober = prober.with_handshake(Arc::new(handshake));
        }

        let deps = Collaborators {
            store,
            provisioner: Arc::new(TerraformProvisioner::new(config.terraform_settings()?)),
            configurator: Arc::new(AnsibleConfigurator::new(config.ansible_settings())),
            prober,
            ssh_port: config.ssh.port,
            probe_timeout: config.probe.timeout,
        };
        let orchestrator = Orchestrator::new(
            deps,
            Arc::new(LogRegistry::new()),
            OrchestratorSettings {
                grace_period: config.logs.grace_period,
            },
        );
        let service = DeploymentService::new(
            orchestrator,
            ServiceSettings {
                read_timeout: config.store.read_timeout,
                stream: config.stream_settings(),
            },
        );

        let token = std::env::var(REPO_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .map(AccessToken::new);

        Ok(Self {
            service,
            project: config.project(),
            config: config.clone(),
            token,
        })
    }
}
