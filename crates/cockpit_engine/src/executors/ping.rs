//! Reachability probe via the system ping, plus reverse name lookup through
//! getent. Both shell out; neither needs raw-socket privileges in the
//! worker.

use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PingOptions {
    pub count: u32,
    pub timeout_secs: u32,
    pub retries: u32,
    pub interval_ms: u64,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            count: 1,
            timeout_secs: 2,
            retries: 0,
            interval_ms: 0,
        }
    }
}

pub async fn ping_address(address: &str, options: &PingOptions) -> bool {
    for attempt in 0..=options.retries {
        if attempt > 0 && options.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.interval_ms)).await;
        }
        if ping_once(address, options).await {
            return true;
        }
    }
    false
}

async fn ping_once(address: &str, options: &PingOptions) -> bool {
    Command::new("ping")
        .arg("-c")
        .arg(options.count.max(1).to_string())
        .arg("-W")
        .arg(options.timeout_secs.max(1).to_string())
        .arg(address)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Reverse lookup; None when the address has no name or resolution fails.
pub async fn resolve_hostname(address: &str) -> Option<String> {
    let output = Command::new("getent")
        .arg("hosts")
        .arg(address)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    stdout
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}
