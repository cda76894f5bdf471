// ABOUTME: Configuration types and parsing for cloudship.yml.
// ABOUTME: Handles YAML parsing, env var interpolation, and collaborator settings.

mod deserialize;
mod env_value;
mod init;
mod ssh;

pub use deserialize::parse_repo;
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use ssh::SshConfig;

use crate::configure::{AnsibleSettings, RetrySettings};
use crate::error::{Error, Result};
use crate::logs::StreamSettings;
use crate::model::{NewDeployment, Project};
use crate::probe::ProbePolicy;
use crate::provision::TerraformSettings;
use crate::types::{CloudProvider, ProjectId, Sizing};
use deserialize::{deserialize_provider, deserialize_repo};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "cloudship.yml";
pub const CONFIG_FILENAME_ALT: &str = "cloudship.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".cloudship/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,

    pub target: TargetConfig,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub probe: ProbePolicy,

    #[serde(default)]
    pub configurator: ConfiguratorConfig,

    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Directory relative paths are resolved against. Set by [`Config::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// GitHub `owner/repo`.
    #[serde(deserialize_with = "deserialize_repo")]
    pub repo: String,
    pub framework: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(deserialize_with = "deserialize_provider")]
    pub provider: CloudProvider,
    pub region: String,
    #[serde(default = "default_cpu")]
    pub cpu: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_cpu() -> String {
    "1".to_string()
}

fn default_memory() -> String {
    "1GB".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguratorConfig {
    #[serde(default = "default_ansible_path")]
    pub path: PathBuf,
    #[serde(default = "default_playbook_dir")]
    pub playbook_dir: PathBuf,
    #[serde(default)]
    pub retries: RetrySettings,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_ansible_path() -> PathBuf {
    PathBuf::from("ansible-playbook")
}

fn default_playbook_dir() -> PathBuf {
    PathBuf::from("ansible")
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for ConfiguratorConfig {
    fn default() -> Self {
        Self {
            path: default_ansible_path(),
            playbook_dir: default_playbook_dir(),
            retries: RetrySettings::default(),
            timeout: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default = "default_terraform_path")]
    pub path: PathBuf,
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Extra environment for terraform, typically provider credentials.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_terraform_path() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".cloudship/workspaces")
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            path: default_terraform_path(),
            modules_dir: default_modules_dir(),
            workspace_dir: default_workspace_dir(),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            timeout: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_consecutive_errors() -> u32 {
    5
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            poll_interval: default_poll_interval(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Bound on status and log reads.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Bound on each record refresh inside a log stream.
    #[serde(default = "default_stream_timeout", with = "humantime_serde")]
    pub stream_timeout: Duration,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".cloudship/state")
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_stream_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            read_timeout: default_read_timeout(),
            stream_timeout: default_stream_timeout(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = config_root(path);
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(Error::InvalidConfig("project.name cannot be empty".to_string()));
        }
        if self.target.region.trim().is_empty() {
            return Err(Error::InvalidConfig("target.region cannot be empty".to_string()));
        }
        if self.probe.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "probe.max_attempts must be at least 1".to_string(),
            ));
        }
        let retries = &self.configurator.retries;
        for (task, policy) in [
            ("configure", &retries.configure),
            ("build", &retries.build),
            ("deploy", &retries.deploy),
        ] {
            policy.validate().map_err(|reason| {
                Error::InvalidConfig(format!("configurator.retries.{task}: {reason}"))
            })?;
        }
        Ok(())
    }

    /// Resolve `path` against the directory the config was loaded from.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Like [`Config::resolve_path`], but a leading `~` expands to `$HOME`.
    fn resolve_user_path(&self, path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~")
            && let Some(home) = std::env::var_os("HOME")
        {
            return PathBuf::from(home).join(rest);
        }
        self.resolve_path(path)
    }

    pub fn ssh_key_path(&self) -> Option<PathBuf> {
        self.ssh
            .key_path
            .as_deref()
            .map(|path| self.resolve_user_path(path))
    }

    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.ssh
            .known_hosts_path
            .as_deref()
            .map(|path| self.resolve_user_path(path))
    }

    pub fn project(&self) -> Project {
        Project {
            id: ProjectId::new(self.project.name.clone()),
            name: self.project.name.clone(),
            repo_full_name: self.project.repo.clone(),
            framework: self.project.framework.clone(),
        }
    }

    /// Inputs for a new deployment, with `env` references resolved now.
    pub fn new_deployment(&self, branch: Option<&str>) -> Result<NewDeployment> {
        Ok(NewDeployment {
            project_id: ProjectId::new(self.project.name.clone()),
            provider: self.target.provider,
            region: self.target.region.clone(),
            sizing: Sizing::new(self.target.cpu.clone(), self.target.memory.clone()),
            branch: branch.unwrap_or(&self.target.branch).to_string(),
            env_vars: resolve_env_map(&self.env)?,
        })
    }

    pub fn terraform_settings(&self) -> Result<TerraformSettings> {
        let p = &self.provisioner;
        Ok(TerraformSettings {
            binary: p.path.clone(),
            modules_dir: self.resolve_path(&p.modules_dir),
            workspace_dir: self.resolve_path(&p.workspace_dir),
            vars: p.vars.clone(),
            env: resolve_env_map(&p.env)?,
            command_timeout: Some(p.timeout),
        })
    }

    pub fn ansible_settings(&self) -> AnsibleSettings {
        let c = &self.configurator;
        AnsibleSettings {
            binary: c.path.clone(),
            playbook_dir: self.resolve_path(&c.playbook_dir),
            ssh_user: self.ssh.user.clone(),
            ssh_key_path: self.ssh_key_path(),
            retries: c.retries.clone(),
            command_timeout: Some(c.timeout),
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            poll_interval: self.logs.poll_interval,
            read_timeout: self.store.stream_timeout,
            max_consecutive_errors: self.logs.max_consecutive_errors,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve_path(&self.store.path)
    }

    pub fn template() -> Self {
        Config {
            project: ProjectConfig {
                name: "my-app".to_string(),
                repo: "my-org/my-app".to_string(),
                framework: "nextjs".to_string(),
            },
            target: TargetConfig {
                provider: CloudProvider::Aws,
                region: "us-east-1".to_string(),
                cpu: "t3.small".to_string(),
                memory: "2GB".to_string(),
                branch: default_branch(),
            },
            env: BTreeMap::new(),
            ssh: SshConfig::default(),
            probe: ProbePolicy::default(),
            configurator: ConfiguratorConfig::default(),
            provisioner: ProvisionerConfig::default(),
            logs: LogsConfig::default(),
            store: StoreConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

/// `.cloudship/config.yml` lives one level below the project root.
fn config_root(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    if parent.file_name().is_some_and(|name| name == ".cloudship") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}
