//! Client configuration.
//!
//! Sources, lowest precedence first: `<config_dir>/rowlens/config.toml`,
//! `./rowlens.toml`, environment variables, explicit values set by the
//! caller.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::RowlensResult;

pub const ENV_URL: &str = "ROWLENS_URL";
pub const ENV_ANON_KEY: &str = "ROWLENS_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "ROWLENS_ACCESS_TOKEN";
pub const ENV_DATABASE_URL: &str = "ROWLENS_DATABASE_URL";

const LOCAL_CONFIG_FILE: &str = "rowlens.toml";

/// Backend connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,
    /// Public (anon) API key.
    pub anon_key: Option<String>,
    /// User session token sent as the bearer instead of the anon key.
    pub access_token: Option<String>,
    /// Direct Postgres URL; selects the sqlx backend when set.
    pub database_url: Option<String>,
    /// Path of the REST API below `url`.
    pub rest_path: String,
    /// Path of the auth API below `url`.
    pub auth_path: String,
    /// Namespaces listed by table introspection.
    pub schemas: Vec<String>,
    /// HTTP request timeout.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            access_token: None,
            database_url: None,
            rest_path: "/rest/v1".to_string(),
            auth_path: "/auth/v1".to_string(),
            schemas: vec!["public".to_string()],
            timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> RowlensResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Values present in the environment. Everything else is default.
    pub fn from_env() -> Self {
        Self {
            url: env_var(ENV_URL),
            anon_key: env_var(ENV_ANON_KEY),
            access_token: env_var(ENV_ACCESS_TOKEN),
            database_url: env_var(ENV_DATABASE_URL),
            ..Self::default()
        }
    }

    /// Layer config files and the environment.
    pub fn discover() -> RowlensResult<Self> {
        let mut config = Self::default();
        for path in config_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "loading config file");
                config = Self::from_file(&path)?.overlay_files(config);
            }
        }
        Ok(config.merge(Self::from_env()))
    }

    /// Take every credential `other` sets, keeping ours otherwise.
    pub fn merge(mut self, other: ClientConfig) -> Self {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.anon_key.is_some() {
            self.anon_key = other.anon_key;
        }
        if other.access_token.is_some() {
            self.access_token = other.access_token;
        }
        if other.database_url.is_some() {
            self.database_url = other.database_url;
        }
        self
    }

    // A later file replaces settings wholesale but keeps credentials an
    // earlier file provided.
    fn overlay_files(self, earlier: ClientConfig) -> Self {
        earlier.merge(self.clone()).with_settings_of(self)
    }

    fn with_settings_of(mut self, other: ClientConfig) -> Self {
        self.rest_path = other.rest_path;
        self.auth_path = other.auth_path;
        self.schemas = other.schemas;
        self.timeout_secs = other.timeout_secs;
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Candidate config files, lowest precedence first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("rowlens").join("config.toml"));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
    paths
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    pub fn anon_key(mut self, key: impl Into<String>) -> Self {
        self.config.anon_key = Some(key.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    pub fn rest_path(mut self, path: impl Into<String>) -> Self {
        self.config.rest_path = path.into();
        self
    }

    pub fn auth_path(mut self, path: impl Into<String>) -> Self {
        self.config.auth_path = path.into();
        self
    }

    pub fn schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.rest_path, "/rest/v1");
        assert_eq!(config.schemas, vec!["public".to_string()]);
        assert!(config.url.is_none());
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            url = "https://demo.example.co"
            anon_key = "anon"
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.url.as_deref(), Some("https://demo.example.co"));
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.auth_path, "/auth/v1");
    }

    #[test]
    fn test_merge_prefers_other_credentials() {
        let base = ClientConfig::builder().url("https://a").anon_key("k1").build();
        let merged = base.merge(ClientConfig::builder().anon_key("k2").build());
        assert_eq!(merged.url.as_deref(), Some("https://a"));
        assert_eq!(merged.anon_key.as_deref(), Some("k2"));
    }

    #[test]
    fn test_later_file_keeps_earlier_credentials() {
        let earlier = ClientConfig::builder().url("https://a").anon_key("k1").build();
        let later = ClientConfig::builder().anon_key("k2").timeout_secs(3).build();
        let config = later.overlay_files(earlier);
        assert_eq!(config.url.as_deref(), Some("https://a"));
        assert_eq!(config.anon_key.as_deref(), Some("k2"));
        assert_eq!(config.timeout_secs, 3);
    }
}
