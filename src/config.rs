//! Monitor configuration loading from environment variables.
//!
//! The harness origin is the only externally configurable input. Invalid
//! values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `QSHIELD_HOST` | 127.0.0.1 | Harness host |
//! | `QSHIELD_PORT` | 9000 | Harness port |

/// Default harness host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default harness port.
pub const DEFAULT_PORT: u16 = 9000;

/// Harness origin. Both the push-channel URL and the REST base are derived
/// from this single host/port pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Load the origin from `QSHIELD_HOST` / `QSHIELD_PORT`.
    pub fn from_env() -> Self {
        let host = std::env::var("QSHIELD_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = parse_u16("QSHIELD_PORT", DEFAULT_PORT);
        Self { host, port }
    }

    /// Push-channel URL (`ws://host:port/ws`).
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }

    /// REST base URL (`http://host:port`).
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// Parse a `u16` env var, returning `default` on missing or invalid.
fn parse_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u16>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Top-level monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub endpoint: Endpoint,
    /// Event log ring capacity.
    pub log_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            log_capacity: crate::eventlog::DEFAULT_LOG_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Configuration with the origin taken from the environment.
    pub fn from_env() -> Self {
        Self {
            endpoint: Endpoint::from_env(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_derive_from_origin() {
        let endpoint = Endpoint::new("harness.local", 9443);
        assert_eq!(endpoint.ws_url(), "ws://harness.local:9443/ws");
        assert_eq!(endpoint.http_base(), "http://harness.local:9443");
    }

    #[test]
    fn default_origin() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 9000);
    }

    #[test]
    fn invalid_port_falls_back() {
        assert_eq!(parse_u16("QSHIELD_TEST_PORT_UNSET", 9000), 9000);
        std::env::set_var("QSHIELD_TEST_PORT_BAD", "not-a-port");
        assert_eq!(parse_u16("QSHIELD_TEST_PORT_BAD", 9000), 9000);
        std::env::remove_var("QSHIELD_TEST_PORT_BAD");
    }
}
