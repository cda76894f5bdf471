// ABOUTME: Persisted records for deployments, instances, and projects.
// ABOUTME: The store treats these as keyed JSON documents.

mod deployment;
mod instance;
mod project;
mod status;

pub use deployment::{DeploymentRecord, NewDeployment};
pub use instance::InstanceRecord;
pub use project::Project;
pub use status::DeploymentStatus;
