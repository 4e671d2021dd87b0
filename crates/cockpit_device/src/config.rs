use once_cell::sync::Lazy;
use std::time::Duration;

const DEFAULT_SSH_TIMEOUT_SECS: u64 = 30;

static SSH_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    std::env::var("COCKPIT_SSH_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_SSH_TIMEOUT_SECS))
});

pub fn ssh_command_timeout() -> Duration {
    *SSH_TIMEOUT
}
