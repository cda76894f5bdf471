// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates cloudship.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config, parse_repo};

pub fn init_config(
    dir: &Path,
    name: Option<&str>,
    repo: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(n) = name {
        if n.trim().is_empty() {
            return Err(Error::InvalidConfig("project name cannot be empty".to_string()));
        }
        config.project.name = n.to_string();
    }

    if let Some(r) = repo {
        config.project.repo = parse_repo(r).map_err(Error::InvalidConfig)?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"project:
  name: {}
  repo: {}
  framework: {}

target:
  provider: {}
  region: {}
  cpu: {}
  memory: {}
  branch: {}

env:
  NODE_ENV: production
  # DATABASE_URL:
  #   env: DATABASE_URL

ssh:
  user: {}
  # key_path: ~/.ssh/id_ed25519
  # Log in and run a command before configuring, not just wait for port 22
  # verify_login: true

# probe:
#   max_attempts: 30
#   timeout: 5m

# configurator:
#   playbook_dir: ansible

# provisioner:
#   modules_dir: terraform
"#,
        config.project.name,
        config.project.repo,
        config.project.framework,
        config.target.provider,
        config.target.region,
        config.target.cpu,
        config.target.memory,
        config.target.branch,
        config.ssh.user,
    )
}
