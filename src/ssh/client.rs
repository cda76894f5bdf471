// ABOUTME: Minimal russh session used to confirm a fresh instance accepts logins.
// ABOUTME: Connects, authenticates with agent or key file, and runs one command.

use super::error::{Error, Result};
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

const DEFAULT_KEYS: [&str; 3] = [".ssh/id_ed25519", ".ssh/id_rsa", ".ssh/id_ecdsa"];

/// Where and as whom to log in.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Tried before the agent and the default key files when set.
    pub key_path: Option<PathBuf>,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    /// Accept and record keys of hosts not yet in known_hosts. New instances
    /// are always unknown, and recycled addresses often present changed keys.
    pub trust_on_first_use: bool,
    /// Bound on connect plus authentication, and separately on each command.
    pub timeout: Duration,
}

/// Exit status and combined output of a remote command.
#[derive(Debug, Clone)]
pub struct Reply {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl Reply {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    known_hosts_path: Option<PathBuf>,
    trust_on_first_use: bool,
}

impl HostKeyCheck {
    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => known_hosts::learn_known_hosts_path(&self.host, self.port, key, path),
            None => known_hosts::learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(host = %self.host, error = %e, "could not record host key");
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => known_hosts::check_known_hosts_path(&self.host, self.port, key, path),
            None => known_hosts::check_known_hosts(&self.host, self.port, key),
        };

        match known {
            Ok(true) => Ok(true),
            Ok(false) if self.trust_on_first_use => {
                tracing::debug!(host = %self.host, port = self.port, "trusting new host key");
                self.learn(key);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                tracing::debug!(host = %self.host, error = %e, "host key check failed");
                Ok(self.trust_on_first_use)
            }
        }
    }
}

enum Credential {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

fn load_key(path: &Path) -> Result<Credential> {
    load_secret_key(path, None)
        .map(|key| Credential::Key(Arc::new(key)))
        .map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn find_credential(config: &SessionConfig) -> Result<Credential> {
    if let Some(path) = &config.key_path {
        return load_key(path);
    }
    if let Ok(agent) = AgentClient::connect_env().await {
        return Ok(Credential::Agent(agent));
    }

    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| Error::NoCredentials("no SSH agent and HOME is unset".to_string()))?;
    DEFAULT_KEYS
        .iter()
        .find_map(|relative| load_key(&home.join(relative)).ok())
        .ok_or_else(|| Error::NoCredentials("no SSH agent and no default key files".to_string()))
}

/// An authenticated session.
pub struct Session {
    handle: Handle<HostKeyCheck>,
    timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Verify that some credential can be loaded, without any network I/O.
    pub async fn check_credentials(config: &SessionConfig) -> Result<()> {
        find_credential(config).await.map(|_| ())
    }

    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        tokio::time::timeout(config.timeout, Self::open(config))
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: config.host.clone(),
                port: config.port,
                after: config.timeout,
            })?
    }

    async fn open(config: &SessionConfig) -> Result<Self> {
        let credential = find_credential(config).await?;
        let check = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            known_hosts_path: config.known_hosts_path.clone(),
            trust_on_first_use: config.trust_on_first_use,
        };
        let russh_config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            check,
        )
        .await
        .map_err(|e| Error::Connection(format!("{}:{}: {e}", config.host, config.port)))?;

        if !authenticate(&mut handle, &config.user, credential).await? {
            return Err(Error::AuthenticationFailed);
        }
        Ok(Self {
            handle,
            timeout: config.timeout,
        })
    }

    /// Run `command` and wait for its exit status.
    pub async fn run(&self, command: &str) -> Result<Reply> {
        tokio::time::timeout(self.timeout, self.run_inner(command))
            .await
            .map_err(|_| Error::CommandTimeout(self.timeout))?
    }

    async fn run_inner(&self, command: &str) -> Result<Reply> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("open channel: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("exec: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(message) = channel.wait().await {
            match message {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(Reply {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    pub async fn close(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}

async fn authenticate(
    handle: &mut Handle<HostKeyCheck>,
    user: &str,
    credential: Credential,
) -> Result<bool> {
    match credential {
        Credential::Key(key) => {
            let hash = handle
                .best_supported_rsa_hash()
                .await
                .map_err(Error::Protocol)?
                .flatten();
            let result = handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                .await
                .map_err(Error::Protocol)?;
            Ok(result.success())
        }
        Credential::Agent(mut agent) => {
            let identities = agent
                .request_identities()
                .await
                .map_err(|e| Error::NoCredentials(format!("agent: {e}")))?;
            if identities.is_empty() {
                return Err(Error::NoCredentials("SSH agent holds no keys".to_string()));
            }
            for identity in identities {
                let accepted = handle
                    .authenticate_publickey_with(user, identity, None, &mut agent)
                    .await
                    .is_ok_and(|result| result.success());
                if accepted {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> SessionConfig {
        SessionConfig {
            host: "10.0.0.5".to_string(),
            port: 22,
            user: "ubuntu".to_string(),
            key_path: Some(PathBuf::from(key)),
            known_hosts_path: None,
            trust_on_first_use: true,
            timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn missing_key_file_is_a_credential_problem() {
        let err = Session::check_credentials(&config("/nonexistent/cloudship/deploy_key"))
            .await
            .unwrap_err();
        assert!(err.is_credential_problem());
    }

    #[tokio::test]
    async fn garbage_key_file_is_a_credential_problem() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, "not a key").unwrap();

        let err = Session::check_credentials(&config(key.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyLoadFailed { .. }));
    }
}
