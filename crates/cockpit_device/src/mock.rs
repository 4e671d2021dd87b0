use crate::{DeviceConnector, DeviceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Scriptable connector for executor tests: canned output per (host,
/// command), hosts that refuse connections, and a call log.
#[derive(Default)]
pub struct MockConnector {
    responses: HashMap<(String, String), String>,
    failing_hosts: Vec<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, host: &str, command: &str, output: &str) -> Self {
        self.responses
            .insert((host.to_string(), command.to_string()), output.to_string());
        self
    }

    pub fn refuse(mut self, host: &str) -> Self {
        self.failing_hosts.push(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn run_command(&self, host: &str, command: &str) -> Result<String, DeviceError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((host.to_string(), command.to_string()));

        if self.failing_hosts.iter().any(|h| h == host) {
            return Err(DeviceError::Connect {
                host: host.to_string(),
                reason: "connection refused".into(),
            });
        }
        match self.responses.get(&(host.to_string(), command.to_string())) {
            Some(output) => Ok(output.clone()),
            None => Err(DeviceError::CommandFailed {
                host: host.to_string(),
                command: command.to_string(),
                status: 1,
                stderr: "unknown command".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_output_and_refusal() {
        let connector = MockConnector::new()
            .respond("10.0.0.1", "show running-config", "hostname r1\n")
            .refuse("10.0.0.2");

        let output = connector
            .run_command("10.0.0.1", "show running-config")
            .await
            .unwrap();
        assert_eq!(output, "hostname r1\n");

        assert!(matches!(
            connector.run_command("10.0.0.2", "show running-config").await,
            Err(DeviceError::Connect { .. })
        ));
        assert_eq!(connector.calls().len(), 2);
    }
}
