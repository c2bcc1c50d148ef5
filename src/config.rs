use std::env;
use std::net::SocketAddr;

use log::warn;

use crate::session::AckPolicy;

/// Configuration for the listener and per-connection sessions.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub listen_addr: SocketAddr,
    /// Size of the per-connection socket read buffer.
    pub read_buffer_size: usize,
    /// Consecutive decode failures tolerated before a session is closed.
    pub max_decode_failures: u32,
    pub ack_policy: AckPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5006)),
            read_buffer_size: 1024,
            max_decode_failures: 8,
            ack_policy: AckPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Build a config from `GT06_*` environment variables, keeping the
    /// default for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("GT06_LISTEN") {
            match value.parse() {
                Ok(addr) => config.listen_addr = addr,
                Err(e) => warn!("ignoring GT06_LISTEN={value:?}: {e}"),
            }
        }
        if let Some(flag) = env_flag("GT06_ACK_BEFORE_LOGIN") {
            config.ack_policy.ack_before_login = flag;
        }
        if let Some(flag) = env_flag("GT06_ACCEPT_BAD_CHECKSUM") {
            config.ack_policy.accept_bad_checksum = flag;
        }
        if let Ok(value) = env::var("GT06_MAX_DECODE_FAILURES") {
            match value.parse() {
                Ok(n) => config.max_decode_failures = n,
                Err(e) => warn!("ignoring GT06_MAX_DECODE_FAILURES={value:?}: {e}"),
            }
        }
        if let Ok(value) = env::var("GT06_LOGIN_ACK_PROTOCOL") {
            let digits = value.trim_start_matches("0x");
            match u8::from_str_radix(digits, 16) {
                Ok(id) => config.ack_policy.login_ack_protocol = id,
                Err(e) => warn!("ignoring GT06_LOGIN_ACK_PROTOCOL={value:?}: {e}"),
            }
        }

        config
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("ignoring {name}={other:?}: expected a boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 5006);
        assert!(!config.ack_policy.ack_before_login);
        assert!(config.ack_policy.accept_bad_checksum);
        assert_eq!(config.ack_policy.login_ack_protocol, 0x01);
        assert_eq!(config.max_decode_failures, 8);
    }
}
