// ABOUTME: Type-safe identifiers and small domain value types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;
mod provider;
mod token;

pub use id::{DeploymentId, Id, InstanceId, ProjectId};
pub use provider::{CloudProvider, ParseProviderError, Sizing};
pub use token::AccessToken;
