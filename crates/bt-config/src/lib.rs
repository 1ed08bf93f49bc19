//! # bt-config
//!
//! Typed configuration, loaded once at start-up:
//! defaults, then `config/basket-talk.toml` (optional), then the
//! environment (`BASKET_TALK__AUTH__JWT_SECRET=...`). `.env` is read first.

use bt_core::FeedLimits;
use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `sqlite:basket_talk.db`, or `memory` for the in-process store.
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(deserialize_with = "secret")]
    pub jwt_secret: SecretString,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Where unauthenticated visitors are sent.
    pub sign_in_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CmsConfig {
    /// WordPress site root. Unset disables the article section.
    pub base_url: Option<String>,
    pub list_ttl_secs: u64,
    pub detail_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub home_limit: usize,
    pub community_limit: usize,
    pub team_board_limit: usize,
}

impl From<&FeedConfig> for FeedLimits {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            home: feed.home_limit,
            community: feed.community_limit,
            team_board: feed.team_board_limit,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub cms: CmsConfig,
    pub feed: FeedConfig,
    pub log: LogConfig,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3000)?
        .set_default("store.url", "sqlite:basket_talk.db")?
        .set_default("store.max_connections", 5)?
        .set_default("auth.jwt_secret", "")?
        .set_default("auth.sign_in_url", "/signin")?
        .set_default("cms.list_ttl_secs", 1800)?
        .set_default("cms.detail_ttl_secs", 3600)?
        .set_default("feed.home_limit", 10)?
        .set_default("feed.community_limit", 20)?
        .set_default("feed.team_board_limit", 100)?
        .set_default("log.level", "info")?
        .set_default("log.format", "pretty")
}

impl AppConfig {
    /// Loads and validates the configuration.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let s = defaults()?
            // Load from config/basket-talk.toml
            .add_source(File::with_name("config/basket-talk").required(false))
            // Override from environment (e.g., BASKET_TALK__AUTH__JWT_SECRET)
            .add_source(
                Environment::with_prefix("BASKET_TALK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document. Not validated.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let s = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(s.try_deserialize()?)
    }

    /// Fails start-up on settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must be set".into()));
        }
        if self.auth.sign_in_url.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.sign_in_url must be set".into()));
        }
        let feed = &self.feed;
        if feed.home_limit == 0 || feed.community_limit == 0 || feed.team_board_limit == 0 {
            return Err(ConfigError::Invalid("feed limits must be positive".into()));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid("store.max_connections must be positive".into()));
        }
        if self.cms.list_ttl_secs == 0 || self.cms.detail_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cms cache ttls must be positive".into()));
        }
        Ok(())
    }

    pub fn feed_limits(&self) -> FeedLimits {
        FeedLimits::from(&self.feed)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_the_secret() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.cms.list_ttl_secs, 1800);
        assert_eq!(config.cms.detail_ttl_secs, 3600);
        assert_eq!(config.cms.base_url, None);
        assert_eq!(config.feed_limits(), FeedLimits::default());
        assert_eq!(config.log.format, LogFormat::Pretty);

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn file_values_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 8080
            cors_origins = ["https://baskettalk.example"]

            [auth]
            jwt_secret = "s3cret"
            issuer = "https://idp.example"

            [feed]
            home_limit = 5

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.cors_origins, vec!["https://baskettalk.example"]);
        assert_eq!(config.auth.jwt_secret.expose_secret(), "s3cret");
        assert_eq!(config.feed.home_limit, 5);
        assert_eq!(config.feed.community_limit, 20);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = AppConfig::from_toml(
            r#"
            [auth]
            jwt_secret = "s3cret"
            [feed]
            team_board_limit = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
