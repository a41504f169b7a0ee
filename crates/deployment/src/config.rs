use serde::{Deserialize, Serialize};
use thiserror::Error;
use utils::assets::config_path;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration persisted as `config.json` in the asset directory.
/// Unknown fields are ignored and missing fields fall back to defaults, so
/// old files keep loading across releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Loads the config file, writing the defaults on first run.
    pub fn load_or_init() -> Result<Config, ConfigError> {
        let path = config_path();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&raw)?;
            return Ok(config);
        }

        let config = Config::default();
        if let Err(err) = config.save() {
            tracing::warn!("Failed to write default config: {err}");
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        std::fs::write(config_path(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config: Config =
            serde_json::from_str(r#"{"port": 8080, "theme": "dark"}"#).unwrap();
        assert_eq!(config.port, 8080);
    }
}
