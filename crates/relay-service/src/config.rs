//! Relay service configuration.
//!
//! Configuration is loaded from environment variables, with a
//! `from_vars` seam so tests can inject values without touching the
//! process environment.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5050";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default room capacity.
pub const DEFAULT_MAX_ROOM_MEMBERS: usize = 2;

/// Default shared-notes size bound, in bytes.
pub const DEFAULT_MAX_NOTES_BYTES: usize = 64 * 1024;

/// Default ICE server handed to clients via `GET /config`.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Relay service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket server bind address (default: "0.0.0.0:5050").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Maximum members per room (default: 2).
    pub max_room_members: usize,

    /// Maximum shared-notes size in bytes (default: 64 KiB).
    pub max_notes_bytes: usize,

    /// ICE server URLs served to clients for their negotiation config.
    pub ice_servers: Vec<String>,

    /// Unique identifier for this relay instance.
    pub relay_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("RELAY_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_room_members = parse_or_default(
            vars,
            "RELAY_MAX_ROOM_MEMBERS",
            DEFAULT_MAX_ROOM_MEMBERS,
        )?;
        if max_room_members < 2 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_MAX_ROOM_MEMBERS".to_string(),
                value: max_room_members.to_string(),
            });
        }

        let max_notes_bytes =
            parse_or_default(vars, "RELAY_MAX_NOTES_BYTES", DEFAULT_MAX_NOTES_BYTES)?;

        let ice_servers = vars
            .get("RELAY_ICE_SERVERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|servers| !servers.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_ICE_SERVER.to_string()]);

        let relay_id = vars.get("RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            max_room_members,
            max_notes_bytes,
            ice_servers,
            relay_id,
        })
    }
}

fn parse_or_default(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.max_room_members, DEFAULT_MAX_ROOM_MEMBERS);
        assert_eq!(config.max_notes_bytes, DEFAULT_MAX_NOTES_BYTES);
        assert_eq!(config.ice_servers, vec![DEFAULT_ICE_SERVER.to_string()]);
        assert!(config.relay_id.starts_with("relay-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:7000".to_string()),
            (
                "RELAY_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:7001".to_string(),
            ),
            ("RELAY_MAX_ROOM_MEMBERS".to_string(), "4".to_string()),
            ("RELAY_MAX_NOTES_BYTES".to_string(), "1024".to_string()),
            (
                "RELAY_ICE_SERVERS".to_string(),
                "stun:stun.example.org:3478, turn:turn.example.org:3478".to_string(),
            ),
            ("RELAY_ID".to_string(), "relay-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:7000");
        assert_eq!(config.health_bind_address, "127.0.0.1:7001");
        assert_eq!(config.max_room_members, 4);
        assert_eq!(config.max_notes_bytes, 1024);
        assert_eq!(
            config.ice_servers,
            vec![
                "stun:stun.example.org:3478".to_string(),
                "turn:turn.example.org:3478".to_string()
            ]
        );
        assert_eq!(config.relay_id, "relay-custom-001");
    }

    #[test]
    fn test_room_capacity_below_two_rejected() {
        let vars = HashMap::from([("RELAY_MAX_ROOM_MEMBERS".to_string(), "1".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unparseable_number_rejected() {
        let vars = HashMap::from([("RELAY_MAX_NOTES_BYTES".to_string(), "lots".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
