//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server and engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `OUTBOX_POLL_INTERVAL_SECS` — outbox publish cadence (default: `1`)
/// - `OFFER_TIMEOUT_SECS` — driver offer timeout (default: `120`)
/// - `EXPIRY_SWEEP_INTERVAL_SECS` — stale-offer sweep cadence (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub outbox_poll_interval: Duration,
    pub offer_timeout: Duration,
    pub expiry_sweep_interval: Duration,
}

fn env_secs(var: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            outbox_poll_interval: env_secs("OUTBOX_POLL_INTERVAL_SECS", 1),
            offer_timeout: env_secs("OFFER_TIMEOUT_SECS", 120),
            expiry_sweep_interval: env_secs("EXPIRY_SWEEP_INTERVAL_SECS", 5),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            outbox_poll_interval: Duration::from_secs(1),
            offer_timeout: Duration::from_secs(120),
            expiry_sweep_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.outbox_poll_interval, Duration::from_secs(1));
        assert_eq!(config.offer_timeout, Duration::from_secs(120));
        assert_eq!(config.expiry_sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
