mod config;
mod mock;
mod ssh;

pub use config::ssh_command_timeout;
pub use mock::MockConnector;
pub use ssh::{SshAuth, SshConnector, DEFAULT_SSH_PORT};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("ssh connect to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("command '{command}' timed out on {host}")]
    Timeout { host: String, command: String },

    #[error("command '{command}' failed on {host} (status {status}): {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: u32,
        stderr: String,
    },

    #[error("unusable credential: {0}")]
    Credential(String),
}

/// The device-access seam. Executors only see this trait; production uses
/// the SSH connector, tests the scriptable mock.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Run one command on the device and return its stdout.
    async fn run_command(&self, host: &str, command: &str) -> Result<String, DeviceError>;
}

pub type DynConnector = Arc<dyn DeviceConnector>;

/// Builds a connector for the credential material of one run. Production
/// hands out SSH sessions; tests substitute a shared mock.
pub trait ConnectorFactory: Send + Sync {
    fn connect(&self, auth: SshAuth) -> DynConnector;
}

pub struct SshConnectorFactory;

impl ConnectorFactory for SshConnectorFactory {
    fn connect(&self, auth: SshAuth) -> DynConnector {
        Arc::new(SshConnector::new(auth))
    }
}

/// Ignores the credential and always returns the same scripted connector.
pub struct FixedConnectorFactory(pub DynConnector);

impl ConnectorFactory for FixedConnectorFactory {
    fn connect(&self, _auth: SshAuth) -> DynConnector {
        self.0.clone()
    }
}
