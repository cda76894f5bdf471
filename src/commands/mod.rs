// ABOUTME: Command module aggregator for the cloudship CLI.
// ABOUTME: Re-exports deploy, inspect, and manage command handlers.

mod context;
mod deploy;
mod inspect;
mod manage;

pub use context::Context;
pub use deploy::{deploy, redeploy, retry};
pub use inspect::{list, logs, status};
pub use manage::{cancel, destroy};
