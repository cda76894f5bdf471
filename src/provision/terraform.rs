// ABOUTME: Provisioner that drives the terraform CLI in a per-deployment workspace.
// ABOUTME: Copies provider modules, runs init/apply/output, and reads the state file.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::{self, ProcessCommand, ProcessOutput};
use crate::types::{DeploymentId, InstanceId};

use super::{ProvisionError, ProvisionRequest, ProvisionedInstance, Provisioner};

/// Where terraform lives and what it works with.
#[derive(Debug, Clone)]
pub struct TerraformSettings {
    pub binary: PathBuf,
    /// Holds one directory of `*.tf` files per provider (`aws/`, `gcp/`, ...).
    pub modules_dir: PathBuf,
    /// Parent of the per-deployment `tf_{id}` workspaces.
    pub workspace_dir: PathBuf,
    /// Extra `-var key=value` pairs passed to every apply.
    pub vars: BTreeMap<String, String>,
    /// Extra environment for terraform, typically provider credentials.
    pub env: BTreeMap<String, String>,
    pub command_timeout: Option<Duration>,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
            modules_dir: PathBuf::from("terraform"),
            workspace_dir: PathBuf::from(".cloudship/workspaces"),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            command_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    settings: TerraformSettings,
}

#[derive(Debug, Deserialize)]
struct OutputValue {
    value: serde_json::Value,
}

impl TerraformProvisioner {
    pub fn new(settings: TerraformSettings) -> Self {
        Self { settings }
    }

    pub fn workspace_for(&self, deployment_id: &DeploymentId) -> PathBuf {
        self.settings
            .workspace_dir
            .join(format!("tf_{}", deployment_id))
    }

    async fn run(&self, workspace: &Path, args: &[String]) -> Result<ProcessOutput, ProvisionError> {
        let mut command = ProcessCommand::new(&self.settings.binary)
            .args(args.iter().cloned())
            .current_dir(workspace);
        for (key, value) in &self.settings.env {
            command = command.env(key, value);
        }
        if let Some(timeout) = self.settings.command_timeout {
            command = command.timeout(timeout);
        }

        let output = process::run(&command).await?;
        if !output.success() {
            return Err(ProvisionError::CommandFailed {
                command: command.display(),
                cwd: workspace.to_path_buf(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    async fn prepare_workspace(
        &self,
        request: &ProvisionRequest,
    ) -> Result<PathBuf, ProvisionError> {
        let workspace = self.workspace_for(&request.deployment_id);
        let workspace_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ProvisionError::Workspace { path, source }
        };

        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(workspace_error(&workspace))?;

        let modules = self.settings.modules_dir.join(request.provider.as_str());
        let mut entries = tokio::fs::read_dir(&modules)
            .await
            .map_err(|_| ProvisionError::MissingModules(modules.clone()))?;

        let mut copied = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(workspace_error(&modules))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tf") {
                let dest = workspace.join(entry.file_name());
                tokio::fs::copy(&path, &dest)
                    .await
                    .map_err(workspace_error(&dest))?;
                copied += 1;
            }
        }

        if copied == 0 {
            return Err(ProvisionError::MissingModules(modules));
        }
        tracing::debug!(workspace = %workspace.display(), copied, "prepared terraform workspace");
        Ok(workspace)
    }

    fn apply_args(&self, request: &ProvisionRequest, instance_type: &str) -> Vec<String> {
        let mut vars = BTreeMap::new();
        vars.insert("deployment_id", request.deployment_id.to_string());
        vars.insert("region", request.region.clone());
        vars.insert("instance_type", instance_type.to_string());

        let mut args = vec!["apply".to_string(), "-auto-approve".to_string()];
        for (key, value) in vars {
            args.push("-var".to_string());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &self.settings.vars {
            args.push("-var".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }

    async fn read_state(workspace: &Path) -> serde_json::Value {
        let path = workspace.join("terraform.tfstate");
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable terraform state");
                serde_json::json!({})
            }),
            Err(_) => serde_json::json!({}),
        }
    }
}

fn parse_outputs(stdout: &str) -> Result<(String, String, Option<String>), ProvisionError> {
    let outputs: HashMap<String, OutputValue> = serde_json::from_str(stdout)
        .map_err(|e| ProvisionError::InvalidOutput(format!("terraform output is not JSON: {e}")))?;

    let text = |key: &str| -> Option<String> {
        outputs.get(key).and_then(|output| match &output.value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
    };

    let instance_id =
        text("instance_id").ok_or_else(|| ProvisionError::InvalidOutput("missing instance_id".into()))?;
    let public_ip =
        text("public_ip").ok_or_else(|| ProvisionError::InvalidOutput("missing public_ip".into()))?;
    Ok((instance_id, public_ip, text("private_ip")))
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        let workspace = self.prepare_workspace(request).await?;
        let instance_type = request.provider.instance_type_for(&request.sizing);

        tracing::info!(
            deployment_id = %request.deployment_id,
            provider = %request.provider,
            region = %request.region,
            instance_type = %instance_type,
            "provisioning instance"
        );

        self.run(&workspace, &["init".to_string()]).await?;
        self.run(&workspace, &self.apply_args(request, &instance_type))
            .await?;
        let output = self
            .run(&workspace, &["output".to_string(), "-json".to_string()])
            .await?;

        let (instance_id, public_ip, private_ip) = parse_outputs(&output.stdout)?;

        Ok(ProvisionedInstance {
            instance_id: InstanceId::new(instance_id),
            instance_type,
            public_ip,
            private_ip,
            provisioning_state: Self::read_state(&workspace).await,
        })
    }

    async fn destroy(&self, deployment_id: &DeploymentId) -> Result<(), ProvisionError> {
        let workspace = self.workspace_for(deployment_id);
        if !tokio::fs::try_exists(&workspace).await.unwrap_or(false) {
            tracing::debug!(%deployment_id, "no terraform workspace, nothing to destroy");
            return Ok(());
        }

        self.run(
            &workspace,
            &["destroy".to_string(), "-auto-approve".to_string()],
        )
        .await?;
        tracing::info!(%deployment_id, "destroyed instance");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloudProvider, Sizing};

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            deployment_id: DeploymentId::new("abc"),
            provider: CloudProvider::Aws,
            region: "us-east-1".to_string(),
            sizing: Sizing::new("1", "2GB"),
        }
    }

    #[test]
    fn outputs_are_parsed_with_optional_private_ip() {
        let json = r#"{
            "instance_id": {"value": "i-0abc", "type": "string"},
            "public_ip": {"value": "54.1.2.3", "type": "string"}
        }"#;
        let (id, public, private) = parse_outputs(json).unwrap();
        assert_eq!(id, "i-0abc");
        assert_eq!(public, "54.1.2.3");
        assert_eq!(private, None);
    }

    #[test]
    fn missing_public_ip_is_invalid_output() {
        let json = r#"{"instance_id": {"value": "i-0abc"}}"#;
        let err = parse_outputs(json).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidOutput(_)));
    }

    #[test]
    fn apply_passes_core_vars_then_extras() {
        let mut settings = TerraformSettings::default();
        settings.vars.insert("project_id".into(), "my-gcp-project".into());
        let provisioner = TerraformProvisioner::new(settings);

        let args = provisioner.apply_args(&request(), "t2.small");
        assert_eq!(
            args,
            vec![
                "apply",
                "-auto-approve",
                "-var",
                "deployment_id=abc",
                "-var",
                "instance_type=t2.small",
                "-var",
                "region=us-east-1",
                "-var",
                "project_id=my-gcp-project",
            ]
        );
    }

    #[test]
    fn workspace_is_per_deployment() {
        let provisioner = TerraformProvisioner::new(TerraformSettings {
            workspace_dir: PathBuf::from("/var/lib/cloudship"),
            ..TerraformSettings::default()
        });
        assert_eq!(
            provisioner.workspace_for(&DeploymentId::new("abc")),
            PathBuf::from("/var/lib/cloudship/tf_abc")
        );
    }

    #[tokio::test]
    async fn destroy_without_workspace_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = TerraformProvisioner::new(TerraformSettings {
            binary: PathBuf::from("/nonexistent/terraform"),
            workspace_dir: dir.path().to_path_buf(),
            ..TerraformSettings::default()
        });
        provisioner.destroy(&DeploymentId::new("never")).await.unwrap();
    }

    #[tokio::test]
    async fn missing_provider_modules_fail_before_running_terraform() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = TerraformProvisioner::new(TerraformSettings {
            binary: PathBuf::from("/nonexistent/terraform"),
            modules_dir: dir.path().join("modules"),
            workspace_dir: dir.path().join("workspaces"),
            ..TerraformSettings::default()
        });
        let err = provisioner.provision(&request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingModules(_)));
    }
}
