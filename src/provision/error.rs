// ABOUTME: Provisioning failures with the diagnostics needed to debug them.
// ABOUTME: Command failures carry the command line, working directory, and raw output.

use std::path::PathBuf;

use crate::process::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(
        "Terraform command failed with exit code {}\nCommand: {command}\nWorking directory: {}\nSTDOUT: {stdout}\nSTDERR: {stderr}",
        .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
        .cwd.display()
    )]
    CommandFailed {
        command: String,
        cwd: PathBuf,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("no terraform modules found in {0}")]
    MissingModules(PathBuf),

    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unusable terraform output: {0}")]
    InvalidOutput(String),
}
