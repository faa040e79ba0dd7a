//! Configuration loading for the SDA coordination layer.
//!
//! Resolution order follows §6: an explicit file path, a configured search
//! path, then environment variables carrying the component's prefix
//! (`BROKER_*`, `DB_*`, `API_*`, `ARCHIVE_*`, `C4GH_*`). Required keys are
//! declared per application; a missing one fails startup with
//! `"<key> not set"`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Database connection settings (`DB_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub sslmode: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            database: "sda".to_string(),
            sslmode: "require".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Postgres connection string built from the resolved fields.
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.sslmode
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("db_host".into()));
        }
        if self.user.is_empty() {
            return Err(Error::Config("db_user".into()));
        }
        Ok(())
    }
}

/// Broker connection settings (`BROKER_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub routing_key: String,
    pub use_tls: bool,
    pub prefetch_count: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5671,
            user: String::new(),
            password: String::new(),
            vhost: "sda".to_string(),
            exchange: "sda".to_string(),
            routing_key: String::new(),
            use_tls: true,
            prefetch_count: 2,
        }
    }
}

impl BrokerConfig {
    pub fn amqp_url(&self) -> String {
        let scheme = if self.use_tls { "amqps" } else { "amqp" };
        format!(
            "{}://{}:{}@{}:{}/{}",
            scheme, self.user, self.password, self.host, self.port, self.vhost
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("broker_host".into()));
        }
        if self.user.is_empty() {
            return Err(Error::Config("broker_user".into()));
        }
        Ok(())
    }
}

/// Admin API settings (`API_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub jwtpubkeypath: Option<String>,
    pub jwtpubkeyurl: Option<String>,
    pub admins: Vec<String>,
    pub request_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwtpubkeypath: None,
            jwtpubkeyurl: None,
            admins: Vec::new(),
            request_timeout_secs: 30,
            readiness_timeout_secs: 5,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jwtpubkeypath.is_none() && self.jwtpubkeyurl.is_none() {
            return Err(Error::Config("api_jwtpubkeypath or api_jwtpubkeyurl".into()));
        }
        Ok(())
    }
}

/// Local object storage settings (`STORAGE_*`), standing in for the S3 or
/// POSIX inbox/archive backends named by interface only in §1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./data".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.root.is_empty() {
            return Err(Error::Config("storage_root".into()));
        }
        Ok(())
    }
}

/// Schema directory and profile settings (`SCHEMA_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub dir: String,
    pub profile: SchemaProfile,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            dir: "schemas".to_string(),
            profile: SchemaProfile::Isolated,
        }
    }
}

/// Which schema profile (§4.6) this process validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaProfile {
    Isolated,
    Federated,
}

impl Default for SchemaProfile {
    fn default() -> Self {
        SchemaProfile::Isolated
    }
}

/// Load a component's configuration from an explicit file, falling back to
/// environment variables prefixed with `env_prefix` (e.g. `"DB_"`).
///
/// Mirrors the teacher's figment-based loading but generalized over any
/// `Deserialize + Default` config struct rather than one monolithic
/// `ServerConfig`.
pub fn load<T>(file: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    let mut figment = Figment::from(figment::providers::Serialized::defaults(T::default()));
    if let Some(path) = file {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed(env_prefix).split("_"));
    figment
        .extract()
        .map_err(|e| Error::Config(format!("failed to load configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_requires_host_and_user() {
        let mut cfg = DatabaseConfig::default();
        cfg.host = String::new();
        assert!(cfg.validate().is_err());

        cfg.host = "db.example.org".to_string();
        assert!(cfg.validate().is_err(), "user still unset");

        cfg.user = "sda".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn broker_amqp_url_reflects_tls_flag() {
        let mut cfg = BrokerConfig {
            host: "mq.example.org".into(),
            user: "ingest".into(),
            ..Default::default()
        };
        assert!(cfg.amqp_url().starts_with("amqps://"));
        cfg.use_tls = false;
        assert!(cfg.amqp_url().starts_with("amqp://"));
    }

    #[test]
    fn api_config_requires_a_jwt_key_source() {
        let cfg = ApiConfig::default();
        assert!(cfg.validate().is_err());

        let cfg = ApiConfig {
            jwtpubkeypath: Some("/etc/sda/jwt.pub".into()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_falls_back_to_defaults_without_file_or_env() {
        let cfg: DatabaseConfig = load(None, "SDA_SHOULD_NOT_EXIST_").unwrap();
        assert_eq!(cfg.database, "sda");
    }

    #[test]
    fn storage_config_requires_a_root() {
        let cfg = StorageConfig { root: String::new() };
        assert!(cfg.validate().is_err());
        assert!(StorageConfig::default().validate().is_ok());
    }
}
