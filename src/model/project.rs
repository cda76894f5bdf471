// ABOUTME: Project reference handed to the orchestrator.
// ABOUTME: Carries the repository coordinates and detected framework.

use serde::{Deserialize, Serialize};

use crate::types::ProjectId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// `owner/repo` on GitHub.
    pub repo_full_name: String,
    /// Framework tag passed through to the configurator (e.g. `nextjs`).
    pub framework: String,
}

impl Project {
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}.git", self.repo_full_name)
    }
}
