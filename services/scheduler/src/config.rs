//! Configuration for the scheduler process.

use std::time::Duration;

use anyhow::Result;

/// Default minimum delay between destructive recovery launches.
const DEFAULT_DESTRUCTIVE_RECOVERY_DELAY_SECS: u64 = 10 * 60;

/// Default time a task must stay failed before it is declared permanently
/// lost.
const DEFAULT_PERMANENT_FAILURE_TIMEOUT_SECS: u64 = 20 * 60;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Path to the service specification JSON document.
    pub spec_path: Option<String>,

    /// Time a task must remain failed before recovery treats the failure as
    /// permanent and tears down its reservations. `None` disables permanent
    /// failure detection entirely.
    pub permanent_failure_timeout: Option<Duration>,

    /// Minimum delay between destructive recovery launches.
    pub destructive_recovery_delay: Duration,

    /// Whether a re-registration callback is fatal. The design assumes the
    /// framework is never re-registered from scratch; disabling this trades
    /// that safety check for uptime.
    pub exit_on_reregister: bool,

    /// Whether a rescinded offer is fatal.
    pub exit_on_rescind: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("ARMADA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let spec_path = std::env::var("ARMADA_SPEC_PATH").ok();

        let permanent_failure_timeout = match std::env::var("ARMADA_PERMANENT_FAILURE_TIMEOUT_SECS")
        {
            Ok(v) if v.is_empty() || v == "off" => None,
            Ok(v) => Some(Duration::from_secs(v.parse()?)),
            Err(_) => Some(Duration::from_secs(DEFAULT_PERMANENT_FAILURE_TIMEOUT_SECS)),
        };

        let destructive_recovery_delay = Duration::from_secs(
            std::env::var("ARMADA_DESTRUCTIVE_RECOVERY_DELAY_SECS")
                .map(|v| v.parse())
                .unwrap_or(Ok(DEFAULT_DESTRUCTIVE_RECOVERY_DELAY_SECS))?,
        );

        let exit_on_reregister = env_flag("ARMADA_EXIT_ON_REREGISTER", true);
        let exit_on_rescind = env_flag("ARMADA_EXIT_ON_RESCIND", true);

        Ok(Self {
            log_level,
            spec_path,
            permanent_failure_timeout,
            destructive_recovery_delay,
            exit_on_reregister,
            exit_on_rescind,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            spec_path: None,
            permanent_failure_timeout: Some(Duration::from_secs(
                DEFAULT_PERMANENT_FAILURE_TIMEOUT_SECS,
            )),
            destructive_recovery_delay: Duration::from_secs(
                DEFAULT_DESTRUCTIVE_RECOVERY_DELAY_SECS,
            ),
            exit_on_reregister: true,
            exit_on_rescind: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(
            config.permanent_failure_timeout,
            Some(Duration::from_secs(1200))
        );
        assert_eq!(config.destructive_recovery_delay, Duration::from_secs(600));
        assert!(config.exit_on_reregister);
        assert!(config.exit_on_rescind);
    }
}
