//! Runtime configuration.
//!
//! All environment access happens here, once, at startup. The resulting
//! [`Settings`] value is passed into constructors — components never read
//! the environment themselves.

use std::time::Duration;

/// Service configuration, resolved from the environment.
///
/// # Environment Variables
///
/// - `PORT` — HTTP port (default: 8080)
/// - `OPENAI_API_KEY` — reasoning-provider credential
/// - `OPENAI_BASE_URL` — provider endpoint (default: `https://api.openai.com/v1`)
/// - `ATTUNE_MODEL` — model identifier (default: `gpt-4o`)
/// - `ATTUNE_DB_PATH` — SQLite database path (default: `attune.db`)
/// - `ATTUNE_IDLE_THRESHOLD_SECS` — inactivity before consolidation (default: 300)
/// - `ATTUNE_POLL_INTERVAL_SECS` — reaper poll period (default: 60)
/// - `ATTUNE_REQUEST_TIMEOUT_SECS` — provider call timeout (default: 120)
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub database_path: String,
    pub idle_threshold: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Settings {
    /// Resolve settings from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 8080),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("ATTUNE_MODEL", "gpt-4o"),
            database_path: env_or("ATTUNE_DB_PATH", "attune.db"),
            idle_threshold: Duration::from_secs(env_parsed("ATTUNE_IDLE_THRESHOLD_SECS", 300)),
            poll_interval: Duration::from_secs(env_parsed("ATTUNE_POLL_INTERVAL_SECS", 60)),
            request_timeout: Duration::from_secs(env_parsed("ATTUNE_REQUEST_TIMEOUT_SECS", 120)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            database_path: "attune.db".to_string(),
            idle_threshold: Duration::from_secs(300),
            poll_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(120),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let settings = Settings::default();
        assert_eq!(settings.idle_threshold, Duration::from_secs(300));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.port, 8080);
    }
}
