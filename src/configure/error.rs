// ABOUTME: Configurator failures.
// ABOUTME: Playbook failures carry the exit code and captured output.

use std::path::PathBuf;

use crate::process::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error(
        "Ansible failed with return code {}\nOutput: {output}",
        .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )]
    PlaybookFailed {
        playbook: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("playbook not found: {0}")]
    MissingPlaybook(PathBuf),

    #[error("failed to write inventory: {0}")]
    Inventory(#[source] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{0}")]
    Rejected(String),
}
