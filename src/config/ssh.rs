// ABOUTME: SSH settings used for readiness handshakes and configurator inventories.
// ABOUTME: Mirrors what an instance image expects: default user, port, and key.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub key_path: Option<PathBuf>,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    /// Fresh instances always present an unknown host key.
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,

    /// Log in and run a command once the port opens, instead of trusting an
    /// open port alone.
    #[serde(default)]
    pub verify_login: bool,
}

fn default_user() -> String {
    "ubuntu".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            key_path: None,
            known_hosts_path: None,
            trust_first_connection: default_trust_first_connection(),
            verify_login: false,
        }
    }
}
