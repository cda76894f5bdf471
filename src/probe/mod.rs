// ABOUTME: Readiness probing for freshly provisioned instances.
// ABOUTME: Polls the administrative port with graduated backoff, then optionally shakes hands.

mod backoff;
mod handshake;
mod policy;
mod prober;

pub use backoff::BackoffSchedule;
pub use handshake::{Handshake, HandshakeError, SshHandshake};
pub use policy::ProbePolicy;
pub use prober::{ProbeError, ProbeOutcome, ReadinessProber};
