// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports the pipeline, its state markers, and the orchestrator that drives it.

mod error;
mod orchestrator;
mod pipeline;
mod state;

pub use error::{PhaseError, PhaseErrorKind};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use pipeline::{Collaborators, Pipeline, RunReport, TransitionResult};
pub use state::{Built, Configured, Deployed, Pending, Provisioned, Reachable};
