// ABOUTME: SSH access used by the readiness probe's login check.
// ABOUTME: Agent or key-file authentication with known_hosts handling.

mod client;
mod error;

pub use client::{Reply, Session, SessionConfig};
pub use error::{Error, Result};
