use crate::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_DAYS_AHEAD, DEFAULT_LAT_LONG, DEFAULT_MAX_PAGES,
    DEFAULT_RADIUS, DEFAULT_RADIUS_UNIT, MAX_PAGE_SIZE, REMOTE_TIMEOUT_SECONDS,
    TICKETMASTER_BASE_URL,
};
use crate::error::{EventsError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ticketmaster: TicketmasterConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TicketmasterConfig {
    /// Usually supplied through the environment rather than the file
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Batch load search center, "latitude,longitude"
    pub lat_long: String,
    pub radius: u32,
    pub unit: String,
    pub days_ahead: i64,
    pub page_size: u32,
    pub max_pages: u32,
    pub locale: String,
    pub sort: String,
}

impl Default for TicketmasterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: TICKETMASTER_BASE_URL.to_string(),
            timeout_seconds: REMOTE_TIMEOUT_SECONDS,
            lat_long: DEFAULT_LAT_LONG.to_string(),
            radius: DEFAULT_RADIUS,
            unit: DEFAULT_RADIUS_UNIT.to_string(),
            days_ahead: DEFAULT_DAYS_AHEAD,
            page_size: MAX_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            locale: "en".to_string(),
            sort: "date,asc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            cors_origins: vec![
                "https://web.telegram.org".to_string(),
                "https://tg.dev".to_string(),
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:4173".to_string(),
                "https://abegood.github.io".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` when present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(CONFIG_PATH).exists() {
            Self::load_from(CONFIG_PATH)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_content = fs::read_to_string(path.as_ref()).map_err(|e| {
            EventsError::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Environment wins over the file: `TM`/`TICKETMASTER_API_KEY`, `TICKETMASTER_BASE_URL`,
    /// `DATABASE_PATH`, `PORT`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("TICKETMASTER_API_KEY").or_else(|| lookup("TM")) {
            self.ticketmaster.api_key = Some(key);
        }
        if let Some(url) = lookup("TICKETMASTER_BASE_URL") {
            self.ticketmaster.base_url = url;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| EventsError::Config(format!("Invalid PORT '{port}': {e}")))?;
        }
        Ok(())
    }

    /// The API key, or a configuration error naming where to set it
    pub fn api_key(&self) -> Result<&str> {
        self.ticketmaster
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                EventsError::Config(
                    "Ticketmaster API key missing; set TM or TICKETMASTER_API_KEY".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ticketmaster.timeout_seconds, 30);
        assert_eq!(config.ticketmaster.page_size, 200);
        assert_eq!(config.server.port, 5000);
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [ticketmaster]
            radius = 40
            days_ahead = 30

            [database]
            path = "/tmp/events.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.ticketmaster.radius, 40);
        assert_eq!(config.ticketmaster.days_ahead, 30);
        assert_eq!(config.ticketmaster.lat_long, "50.0755,14.4378");
        assert_eq!(config.database.path, "/tmp/events.db");
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("TM", "secret"), ("PORT", "8080"), ("DATABASE_PATH", "x.db")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key().unwrap(), "secret");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "x.db");
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(EventsError::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml_str("[server\nport = "),
            Err(EventsError::Toml(_))
        ));
    }
}
