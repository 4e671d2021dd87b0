use crate::{config, DeviceConnector, DeviceError};
use async_ssh2_tokio::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Resolved authentication material for one run. Plaintext lives only for
/// the lifetime of the task that decrypted it.
#[derive(Clone)]
pub enum SshAuth {
    Password { username: String, password: String },
    Key {
        username: String,
        private_key: String,
        passphrase: Option<String>,
    },
}

impl SshAuth {
    fn username(&self) -> &str {
        match self {
            SshAuth::Password { username, .. } => username,
            SshAuth::Key { username, .. } => username,
        }
    }

    fn method(&self) -> AuthMethod {
        match self {
            SshAuth::Password { password, .. } => AuthMethod::with_password(password),
            SshAuth::Key {
                private_key,
                passphrase,
                ..
            } => AuthMethod::with_key(private_key, passphrase.as_deref()),
        }
    }
}

/// One SSH session per device task; the connector opens a fresh client per
/// command batch and the worker drops it when the device is done.
pub struct SshConnector {
    auth: SshAuth,
    port: u16,
}

impl SshConnector {
    pub fn new(auth: SshAuth) -> Self {
        Self {
            auth,
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn connect(&self, host: &str) -> Result<Client, DeviceError> {
        let server_check = ServerCheckMethod::DefaultKnownHostsFile;
        let username = self.auth.username().to_string();
        let method = self.auth.method();

        let client = match SocketAddr::from_str(host) {
            Ok(addr) => Client::connect(addr, &username, method, server_check).await,
            Err(_) => Client::connect((host, self.port), &username, method, server_check).await,
        };
        client.map_err(|err| DeviceError::Connect {
            host: host.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl DeviceConnector for SshConnector {
    async fn run_command(&self, host: &str, command: &str) -> Result<String, DeviceError> {
        let client = self.connect(host).await?;
        debug!(host, command, "ssh exec");
        let result = tokio::time::timeout(config::ssh_command_timeout(), client.execute(command))
            .await
            .map_err(|_| DeviceError::Timeout {
                host: host.to_string(),
                command: command.to_string(),
            })?
            .map_err(|err| DeviceError::Connect {
                host: host.to_string(),
                reason: err.to_string(),
            })?;

        if result.exit_status != 0 {
            return Err(DeviceError::CommandFailed {
                host: host.to_string(),
                command: command.to_string(),
                status: result.exit_status,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }
}
