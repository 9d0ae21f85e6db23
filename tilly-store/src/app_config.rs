use serde::Deserialize;
use std::env;
use tilly_shared::Masked;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeEnv {
    Development,
    Production,
    Test,
}

/// Where repositories keep their data.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub node_env: NodeEnv,
    pub storage: StorageBackend,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub secret_key: Option<Masked<String>>,
    pub jwt_expiration_seconds: u64,
    pub enable_query_logging: bool,
    pub enable_req_body_logging: bool,
    pub mail: MailConfig,
    pub redis: RedisConfig,
    pub slack: SlackConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<Masked<String>>,
    pub enable_ssl: bool,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub enable: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: Option<bool>,
    pub user: Option<String>,
    pub pass: Option<Masked<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl RedisConfig {
    pub fn url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(format!("redis://{}:{}", host, self.port.unwrap_or(6379)))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    pub bot_token: Option<Masked<String>>,
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    /// How long a claimed job may run before it is handed out again.
    pub lease_ms: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .set_default("node_env", "development")?
            .set_default("storage", "postgres")?
            .set_default("server.port", 3000)?
            .set_default("database.port", 5432)?
            .set_default("database.enable_ssl", false)?
            .set_default("database.max_connections", 5)?
            .set_default("jwt_expiration_seconds", 86400)?
            .set_default("enable_query_logging", false)?
            .set_default("enable_req_body_logging", false)?
            .set_default("mail.enable", false)?
            .set_default("slack.api_url", "https://slack.com/api")?
            .set_default("worker.poll_interval_ms", 500)?
            .set_default("worker.batch_size", 50)?
            .set_default("worker.lease_ms", 30000)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // TW_SECRET_KEY, TW_DATABASE__HOST, TW_MAIL__ENABLE, ...
            .add_source(
                config::Environment::with_prefix("TW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Checks the settings that must be present before the server starts.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.secret_key.as_ref().map_or(true, Masked::is_blank) {
            return Err(ConfigValidationError::Missing("TW_SECRET_KEY"));
        }

        if self.storage == StorageBackend::Postgres {
            let db = &self.database;
            require_text(db.name.as_deref(), "TW_DATABASE__NAME")?;
            require_text(db.host.as_deref(), "TW_DATABASE__HOST")?;
            require_text(db.username.as_deref(), "TW_DATABASE__USERNAME")?;
            if db.password.as_ref().map_or(true, Masked::is_blank) {
                return Err(ConfigValidationError::Missing("TW_DATABASE__PASSWORD"));
            }
        }

        if self.mail.enable {
            let mail = &self.mail;
            require_text(mail.host.as_deref(), "TW_MAIL__HOST")?;
            require(mail.port, "TW_MAIL__PORT")?;
            require(mail.secure, "TW_MAIL__SECURE")?;
            require_text(mail.user.as_deref(), "TW_MAIL__USER")?;
            if mail.pass.as_ref().map_or(true, Masked::is_blank) {
                return Err(ConfigValidationError::Missing("TW_MAIL__PASS"));
            }
            require_text(self.redis.host.as_deref(), "TW_REDIS__HOST")?;
            require(self.redis.port, "TW_REDIS__PORT")?;
        }

        Ok(())
    }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigValidationError> {
    value.ok_or(ConfigValidationError::Missing(name))
}

fn require_text<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigValidationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigValidationError::Missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            node_env: NodeEnv::Test,
            storage: StorageBackend::Postgres,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                host: Some("localhost".into()),
                port: 5432,
                name: Some("tillywork".into()),
                username: Some("tilly".into()),
                password: Some(Masked("secret".into())),
                enable_ssl: false,
                max_connections: 5,
            },
            secret_key: Some(Masked("signing-key".into())),
            jwt_expiration_seconds: 3600,
            enable_query_logging: false,
            enable_req_body_logging: false,
            mail: MailConfig { enable: false, host: None, port: None, secure: None, user: None, pass: None },
            redis: RedisConfig { host: None, port: None },
            slack: SlackConfig { bot_token: None, api_url: "https://slack.com/api".into() },
            worker: WorkerConfig { poll_interval_ms: 500, batch_size: 50, lease_ms: 30000 },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_secret_key_required() {
        let mut config = valid();
        config.secret_key = Some(Masked("  ".into()));
        assert_eq!(config.validate(), Err(ConfigValidationError::Missing("TW_SECRET_KEY")));
    }

    #[test]
    fn test_database_only_required_for_postgres() {
        let mut config = valid();
        config.database.host = None;
        assert_eq!(config.validate(), Err(ConfigValidationError::Missing("TW_DATABASE__HOST")));

        config.storage = StorageBackend::Memory;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_mail_requires_mail_and_redis_settings() {
        let mut config = valid();
        config.mail.enable = true;
        assert_eq!(config.validate(), Err(ConfigValidationError::Missing("TW_MAIL__HOST")));

        config.mail = MailConfig {
            enable: true,
            host: Some("smtp.example.com".into()),
            port: Some(465),
            secure: Some(true),
            user: Some("mailer".into()),
            pass: Some(Masked("pw".into())),
        };
        assert_eq!(config.validate(), Err(ConfigValidationError::Missing("TW_REDIS__HOST")));

        config.redis = RedisConfig { host: Some("localhost".into()), port: Some(6379) };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.redis.url().as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_node_env_rejects_unknown_values() {
        assert!(serde_json::from_str::<NodeEnv>("\"staging\"").is_err());
        assert_eq!(serde_json::from_str::<NodeEnv>("\"production\"").unwrap(), NodeEnv::Production);
    }
}
