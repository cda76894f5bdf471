// ABOUTME: Configurator that runs ansible-playbook against a single host.
// ABOUTME: Writes a temporary inventory and streams playbook output to the log sink.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::logs::LogSink;
use crate::process::{self, ProcessCommand};

use super::{AppTarget, ConfigureError, Configurator, RetrySettings, Task};

/// Environment variable carrying the repository token to playbooks. Kept
/// out of the command line so it doesn't show up in process listings.
pub const REPO_TOKEN_ENV: &str = "CLOUDSHIP_REPO_TOKEN";

#[derive(Debug, Clone)]
pub struct AnsibleSettings {
    pub binary: PathBuf,
    /// Holds `configure.yml`, `build.yml` and `deploy.yml`.
    pub playbook_dir: PathBuf,
    pub ssh_user: String,
    pub ssh_key_path: Option<PathBuf>,
    pub retries: RetrySettings,
    pub command_timeout: Option<Duration>,
}

impl Default for AnsibleSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ansible-playbook"),
            playbook_dir: PathBuf::from("ansible"),
            ssh_user: "ubuntu".to_string(),
            ssh_key_path: None,
            retries: RetrySettings::default(),
            command_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnsibleConfigurator {
    settings: AnsibleSettings,
}

impl AnsibleConfigurator {
    pub fn new(settings: AnsibleSettings) -> Self {
        Self { settings }
    }

    fn inventory(&self, host: &str) -> String {
        let mut line = format!("{host} ansible_user={}", self.settings.ssh_user);
        if let Some(key) = &self.settings.ssh_key_path {
            line.push_str(&format!(" ansible_ssh_private_key_file={}", key.display()));
        }
        line.push_str(
            " ansible_ssh_common_args='-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null'",
        );
        format!(
            "[web]\n{line}\n\n[web:vars]\nansible_python_interpreter=/usr/bin/python3\n"
        )
    }

    fn extra_vars(task: Task, target: &AppTarget) -> serde_json::Value {
        match task {
            Task::Configure => serde_json::json!({
                "repo_url": target.repo_url,
                "branch": target.branch,
                "env_vars": target.env_vars,
                "framework": target.framework,
                "project_dir": null,
            }),
            Task::Build | Task::Deploy => serde_json::json!({
                "framework": target.framework,
                "project_dir": null,
            }),
        }
    }

    /// One playbook run. Output lines are forwarded as `Ansible: {line}`.
    async fn run_playbook(
        &self,
        task: Task,
        target: &AppTarget,
        sink: &LogSink,
    ) -> Result<String, ConfigureError> {
        let playbook_name = format!("{task}.yml");
        let playbook = self.settings.playbook_dir.join(&playbook_name);
        if !tokio::fs::try_exists(&playbook).await.unwrap_or(false) {
            return Err(ConfigureError::MissingPlaybook(playbook));
        }

        // Removed when dropped, on every exit path.
        let inventory = tempfile::Builder::new()
            .prefix("cloudship-inventory-")
            .suffix(".ini")
            .tempfile()
            .map_err(ConfigureError::Inventory)?;
        tokio::fs::write(inventory.path(), self.inventory(&target.host))
            .await
            .map_err(ConfigureError::Inventory)?;

        let mut command = ProcessCommand::new(&self.settings.binary)
            .arg("-i")
            .arg(inventory.path().display().to_string())
            .arg(playbook.display().to_string())
            .arg("--extra-vars")
            .arg(Self::extra_vars(task, target).to_string());
        if let Some(token) = &target.access_token {
            command = command.env(REPO_TOKEN_ENV, token.expose());
        }
        if let Some(timeout) = self.settings.command_timeout {
            command = command.timeout(timeout);
        }

        sink.debug(format!("Executing: ansible-playbook {playbook_name}"));
        let output = process::run_streaming(&command, |line| {
            sink.debug(format!("Ansible: {line}"));
        })
        .await?;

        if !output.success() {
            let code = output
                .exit_code
                .map_or_else(|| "none".to_string(), |c| c.to_string());
            sink.debug(format!("Ansible failed with return code {code}"));
            return Err(ConfigureError::PlaybookFailed {
                playbook: playbook_name,
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        sink.debug(format!("Ansible playbook {playbook_name} completed successfully"));
        Ok(output.stdout)
    }

    async fn run_task(
        &self,
        task: Task,
        target: &AppTarget,
        sink: &LogSink,
    ) -> Result<(), ConfigureError> {
        let policy = match task {
            Task::Configure => &self.settings.retries.configure,
            Task::Build => &self.settings.retries.build,
            Task::Deploy => &self.settings.retries.deploy,
        };

        policy
            .run(task.label(), sink, |_| self.run_playbook(task, target, sink))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Configurator for AnsibleConfigurator {
    async fn configure(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError> {
        sink.debug(format!("Starting instance configuration for {}", target.host));
        self.run_task(Task::Configure, target, sink).await?;
        sink.debug("Instance configuration completed successfully");
        Ok(())
    }

    async fn build(&self, target: &AppTarget, sink: &LogSink) -> Result<(), ConfigureError> {
        sink.debug(format!("Starting application build for {}", target.framework));
        self.run_task(Task::Build, target, sink).await
    }

    async fn deploy(&self, target: &AppTarget, sink: &LogSink) -> Result<String, ConfigureError> {
        sink.debug("Starting application deployment");
        self.run_task(Task::Deploy, target, sink).await?;
        Ok(format!("http://{}", target.host))
    }
}
