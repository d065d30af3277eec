//! Configuration file support

use docchat_session::Theme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Backend address used when neither the config nor the command line names one
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:50505";

/// Configuration for docchat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat backend
    pub backend_url: Option<String>,
    /// Send questions to the history endpoint so conversations are stored
    pub history: Option<bool>,
    /// Color theme (light, dark)
    pub theme: Option<Theme>,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("DOCCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Parse config file content
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            backend_url: Some(DEFAULT_BACKEND_URL.to_string()),
            history: Some(false),
            theme: Some(Theme::Light),
            headers: BTreeMap::new(),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Backend URL, with a command-line value taking precedence
    pub fn backend_url(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# docchat configuration file
# Place at ~/.config/docchat/config.toml (Linux) or set DOCCHAT_CONFIG_PATH

# Base URL of the chat backend
backend_url = "http://127.0.0.1:50505"

# Use the history endpoint (/history/generate) instead of /conversation
history = false

# Color theme (light, dark)
theme = "light"

# Extra headers sent with every request (optional)
[headers]
# "x-ms-client-principal-id" = "00000000-0000-0000-0000-000000000000"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(example_config()).unwrap();
        assert_eq!(config.backend_url.as_deref(), Some(DEFAULT_BACKEND_URL));
        assert_eq!(config.history, Some(false));
        assert_eq!(config.theme, Some(Theme::Light));
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::parse("theme = \"dark\"").unwrap();
        assert_eq!(config.theme, Some(Theme::Dark));
        assert_eq!(config.backend_url, None);
        assert_eq!(config.history, None);
    }

    #[test]
    fn test_headers_table() {
        let config = Config::parse("[headers]\nx-api-key = \"secret\"\n").unwrap();
        assert_eq!(config.headers.get("x-api-key").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_cli_backend_url_wins() {
        let config = Config {
            backend_url: Some("http://from-file".to_string()),
            ..Default::default()
        };
        assert_eq!(config.backend_url(Some("http://from-cli")), "http://from-cli");
        assert_eq!(config.backend_url(None), "http://from-file");
        assert_eq!(Config::default().backend_url(None), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let config = Config {
            backend_url: Some("http://localhost:1234".to_string()),
            history: Some(true),
            theme: Some(Theme::Dark),
            headers: BTreeMap::from([("x-test".to_string(), "1".to_string())]),
        };
        let content = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&content).unwrap(), config);
    }
}
