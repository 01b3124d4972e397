//! JSON configuration shared by both binaries.
//!
//! ```json
//! {
//!   "server": { "port": 49518, "tick_rate": 60, "character": "fighter" },
//!   "client": {
//!     "port": 0,
//!     "target": { "address": "127.0.0.1", "port": 49518, "game": 0 },
//!     "team": "any",
//!     "character": "fighter"
//!   }
//! }
//! ```
//!
//! Every field has a default, so partial files are fine.

use crate::protocol::{GameId, Team};
use crate::DEFAULT_PORT;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl NetConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Template every joining peer plays
    pub character: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_rate: 60,
            character: "fighter".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local port, 0 for an ephemeral one
    pub port: u16,
    pub target: TargetConfig,
    #[serde(serialize_with = "team_name", deserialize_with = "parse_team")]
    pub team: Team,
    /// Address to announce when the server is on a public network
    pub public_address: Option<Ipv4Addr>,
    /// Template the local mirror simulates every character with. Should match
    /// the server's `character`.
    pub character: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 0,
            target: TargetConfig::default(),
            team: Team::Any,
            public_address: None,
            character: "fighter".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub game: GameId,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::LOCALHOST,
            port: DEFAULT_PORT,
            game: 0,
        }
    }
}

fn team_name<S: Serializer>(team: &Team, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(team)
}

fn parse_team<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Team, D::Error> {
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = assert_ok!(NetConfig::from_json("{}"));
        assert_eq!(config, NetConfig::default());
        assert_eq!(config.server.port, 49518);
        assert_eq!(config.server.character, "fighter");
        assert_eq!(config.client.team, Team::Any);
        assert_eq!(config.client.target.address, Ipv4Addr::LOCALHOST);
        assert_eq!(config.client.character, "fighter");
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{
            "server": { "tick_rate": 30 },
            "client": {
                "target": { "address": "10.0.0.5", "game": 7 },
                "team": "two",
                "public_address": "203.0.113.9",
                "character": "archer"
            }
        }"#;
        let config = assert_ok!(NetConfig::from_json(json));

        assert_eq!(config.server.tick_rate, 30);
        assert_eq!(config.server.port, 49518);
        assert_eq!(config.client.target.address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(config.client.target.port, 49518);
        assert_eq!(config.client.target.game, 7);
        assert_eq!(config.client.team, Team::Two);
        assert_eq!(config.client.character, "archer");
        assert_eq!(
            config.client.public_address,
            Some(Ipv4Addr::new(203, 0, 113, 9))
        );
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let mut config = NetConfig::default();
        config.client.team = Team::One;
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"team\":\"one\""));
        assert_eq!(NetConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert_err!(NetConfig::from_json(r#"{"client": {"team": "red"}}"#));
        assert_err!(NetConfig::from_json("not json"));
        assert!(matches!(
            NetConfig::load("/nonexistent/netcode.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
