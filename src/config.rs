//! Application configuration
//!
//! Loaded from a TOML file, every section falls back to its defaults.
//! Environment variables used by the deployment override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::MissingUpdatePolicy;
use crate::infrastructure::crypto::JwtConfig;
use crate::infrastructure::DatabaseConfig;

/// Environment variable pointing at the config file
pub const CONFIG_ENV: &str = "RESERVATIONS_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub reservations: ReservationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds granted to in-flight requests on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9099,
            shutdown_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Either a full `url` or the Postgres parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: String,
    pub connect_timeout_secs: u64,
    pub max_connections: Option<u32>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: 5432,
            user: None,
            password: None,
            name: "reservations_v3".to_string(),
            connect_timeout_secs: 2,
            max_connections: None,
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.host {
            Some(host) => {
                let credentials = match (&self.user, &self.password) {
                    (Some(user), Some(password)) => format!("{}:{}@", user, password),
                    (Some(user), None) => format!("{}@", user),
                    _ => String::new(),
                };
                format!(
                    "postgres://{}{}:{}/{}",
                    credentials, host, self.port, self.name
                )
            }
            None => DatabaseConfig::default().url,
        }
    }

    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.connection_url(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_connections: self.max_connections,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HS256 secret, takes precedence over Keycloak
    pub jwt_secret: Option<String>,
    pub keycloak_host: String,
    pub keycloak_realm: String,
    pub issuer: Option<String>,
    pub jwks_timeout_secs: u64,
    /// Minimum seconds between key set refetches for unknown `kid`s
    pub jwks_min_refetch_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            keycloak_host: "keycloak".to_string(),
            keycloak_realm: "biletado".to_string(),
            issuer: None,
            jwks_timeout_secs: 3,
            jwks_min_refetch_secs: 30,
        }
    }
}

impl AuthConfig {
    pub fn jwt_config(&self) -> JwtConfig {
        let config = match &self.jwt_secret {
            Some(secret) => JwtConfig::with_secret(secret.clone()),
            None => JwtConfig::keycloak(
                &self.keycloak_host,
                &self.keycloak_realm,
                Duration::from_secs(self.jwks_timeout_secs),
            )
            .with_min_refetch(Duration::from_secs(self.jwks_min_refetch_secs)),
        };
        JwtConfig {
            issuer: self.issuer.clone(),
            ..config
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReservationsConfig {
    /// Upper bound of every store operation
    pub request_timeout_secs: u64,
    pub missing_update: MissingUpdatePolicy,
}

impl Default for ReservationsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 5,
            missing_update: MissingUpdatePolicy::Upsert,
        }
    }
}

impl ReservationsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `$RESERVATIONS_CONFIG`, else `<config dir>/biletado-reservations/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("biletado-reservations")
        .join("config.toml")
}

impl AppConfig {
    /// Load from `path`; a missing file yields defaults. Env overrides are applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, raw).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply deployment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("POSTGRES_RESERVATIONS_USER") {
            self.database.user = Some(user);
        }
        if let Some(password) = lookup("POSTGRES_RESERVATIONS_PASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(host) = lookup("POSTGRES_RESERVATIONS_HOST") {
            self.database.host = Some(host);
            // Explicit parts win over a file-level URL
            self.database.url = None;
        }
        if let Some(port) = lookup("POSTGRES_RESERVATIONS_PORT").and_then(|p| p.parse().ok()) {
            self.database.port = port;
        }
        if let Some(name) = lookup("POSTGRES_RESERVATIONS_DBNAME")
            .or_else(|| lookup("POSTGRES_RESERVATIONS_NAME"))
        {
            self.database.name = name;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("KEYCLOAK_HOST") {
            self.auth.keycloak_host = host;
        }
        if let Some(realm) = lookup("KEYCLOAK_REALM") {
            self.auth.keycloak_realm = realm;
        }
    }
}
