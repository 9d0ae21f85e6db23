use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{ConnectOptions, Pool, Postgres};
use std::time::Duration;
use tilly_core::RepoError;
use tracing::info;

use crate::app_config::DatabaseConfig;
use crate::StoreError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig, log_queries: bool) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(connect_options(config, log_queries))
            .await?;

        info!(
            "Connected to postgres at {}:{}",
            config.host.as_deref().unwrap_or("localhost"),
            config.port
        );
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

fn connect_options(config: &DatabaseConfig, log_queries: bool) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port)
        .ssl_mode(if config.enable_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });
    if let Some(name) = &config.name {
        options = options.database(name);
    }
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password.expose());
    }
    if !log_queries {
        options = options.disable_statement_logging();
    }
    options
}

/// Maps a driver error onto the repository error the domain understands.
pub(crate) fn db_error(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::RowNotFound => RepoError::NotFound(err.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            RepoError::Conflict(db.message().to_string())
        }
        _ => {
            tracing::error!("Database error: {}", err);
            RepoError::Backend(err.to_string())
        }
    }
}

/// Decodes a text column holding a serde enum (`"slack"`, `"CARD_ASSIGNED"`, ...).
pub(crate) fn decode_text<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T, RepoError> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| RepoError::Backend(format!("Unexpected {} value {:?}", column, value)))
}

pub(crate) fn encode_text<T: serde::Serialize>(value: &T) -> Result<String, RepoError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(RepoError::Backend(format!("Cannot store {} as text", other))),
        Err(e) => Err(RepoError::Backend(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilly_shared::{NotificationChannel, NotificationType};

    #[test]
    fn test_enum_text_columns() {
        assert_eq!(encode_text(&NotificationType::DueDateReminder).unwrap(), "DUE_DATE_REMINDER");
        let channel: NotificationChannel = decode_text("channel", "in_app").unwrap();
        assert_eq!(channel, NotificationChannel::InApp);
        assert!(decode_text::<NotificationChannel>("channel", "pigeon").is_err());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(db_error(sqlx::Error::RowNotFound), RepoError::NotFound(_)));
        assert!(matches!(db_error(sqlx::Error::PoolTimedOut), RepoError::Backend(_)));
    }
}
