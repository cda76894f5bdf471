// ABOUTME: Library root for cloudship - exposes the deployment engine and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod configure;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod logs;
pub mod model;
pub mod output;
pub mod probe;
pub mod process;
pub mod provision;
pub mod service;
pub mod ssh;
pub mod store;
pub mod types;
