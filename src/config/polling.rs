use std::time::Duration;

use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Fixed-interval, bounded polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub readiness: PollPolicy,
    pub qr: PollPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            readiness: PollPolicy::new(Duration::from_secs(1), 30),
            qr: PollPolicy::new(Duration::from_secs(1), 60),
        }
    }
}

impl PollingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let readiness = resolve_policy(
            "READINESS_POLL_INTERVAL_MS",
            settings.polling.readiness_interval_ms,
            "READINESS_MAX_ATTEMPTS",
            settings.polling.readiness_max_attempts,
        )?;
        let qr = resolve_policy(
            "QR_POLL_INTERVAL_MS",
            settings.polling.qr_interval_ms,
            "QR_MAX_ATTEMPTS",
            settings.polling.qr_max_attempts,
        )?;
        Ok(Self { readiness, qr })
    }
}

fn resolve_policy(
    interval_key: &str,
    interval_default: u64,
    attempts_key: &str,
    attempts_default: u32,
) -> Result<PollPolicy, ConfigError> {
    let interval_ms = parse_optional_env::<u64>(interval_key, "a non-negative integer")?
        .unwrap_or(interval_default);
    let max_attempts = parse_optional_env::<u32>(attempts_key, "a positive integer")?
        .unwrap_or(attempts_default);
    if max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            key: attempts_key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(PollPolicy::new(
        Duration::from_millis(interval_ms),
        max_attempts,
    ))
}
