use crate::error::{BlockchainError, Result};
use crate::network::gossip::{DEFAULT_MAX_CONNECTION_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS};
use crate::network::{GossipSettings, DEFAULT_NATS_URL};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

const NATS_URL_KEY: &str = "NATS_URL";
const MINER_ID_KEY: &str = "MINER_ID";
const RECONNECT_DELAY_KEY: &str = "RECONNECT_DELAY_MS";
const MAX_ATTEMPTS_KEY: &str = "MAX_CONNECTION_ATTEMPTS";
const MINE_INTERVAL_KEY: &str = "MINE_INTERVAL_MS";

/// Node settings: defaults, then an optional TOML file, then the environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nats_url: String,
    pub miner_id: Option<String>,
    pub reconnect_delay_ms: u64,
    pub max_connection_attempts: u32,
    /// Mine pending transactions on this interval; unset means never
    pub mine_interval_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nats_url: DEFAULT_NATS_URL.to_string(),
            miner_id: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_connection_attempts: DEFAULT_MAX_CONNECTION_ATTEMPTS,
            mine_interval_ms: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Load `path` (if given) and apply environment overrides on top
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_env() -> Result<Config> {
        Self::load(None)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(NATS_URL_KEY) {
            self.nats_url = url;
        }
        if let Some(miner_id) = lookup(MINER_ID_KEY) {
            self.miner_id = Some(miner_id);
        }
        if let Some(delay) = lookup(RECONNECT_DELAY_KEY) {
            self.reconnect_delay_ms = parse_number(RECONNECT_DELAY_KEY, &delay)?;
        }
        if let Some(attempts) = lookup(MAX_ATTEMPTS_KEY) {
            self.max_connection_attempts = parse_number(MAX_ATTEMPTS_KEY, &attempts)?;
        }
        if let Some(interval) = lookup(MINE_INTERVAL_KEY) {
            self.mine_interval_ms = Some(parse_number(MINE_INTERVAL_KEY, &interval)?);
        }
        Ok(())
    }

    pub fn gossip_settings(&self) -> GossipSettings {
        GossipSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_connection_attempts: self.max_connection_attempts,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BlockchainError::Config(format!("{key} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.nats_url, "nats://127.0.0.1:4222");
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.max_connection_attempts, 5);
        assert_eq!(
            config.gossip_settings().reconnect_delay,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("miner_id = \"node-3\"\nmine_interval_ms = 2500\n").unwrap();
        assert_eq!(config.miner_id.as_deref(), Some("node-3"));
        assert_eq!(config.mine_interval_ms, Some(2500));
        assert_eq!(config.max_connection_attempts, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "nats_url = \"nats://broker:4222\"").unwrap();
        writeln!(file, "reconnect_delay_ms = 100").unwrap();

        let config = Config::from_toml_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(config.nats_url, "nats://broker:4222");
        assert_eq!(config.reconnect_delay_ms, 100);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml_str("reconnect_delay_ms = \"soon\""),
            Err(BlockchainError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("NATS_URL", "nats://other:4222"),
            ("MAX_CONNECTION_ATTEMPTS", "9"),
            ("MINER_ID", "3001"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.nats_url, "nats://other:4222");
        assert_eq!(config.max_connection_attempts, 9);
        assert_eq!(config.miner_id.as_deref(), Some("3001"));
    }

    #[test]
    fn test_non_numeric_override_rejected() {
        let mut config = Config::default();
        assert!(config
            .apply_overrides(|key| (key == "RECONNECT_DELAY_MS").then(|| "later".to_string()))
            .is_err());
    }
}
