pub mod app_config;
pub mod card_repo;
pub mod database;
pub mod list_repo;
pub mod notification_repo;
pub mod preference_repo;
pub mod project_repo;
pub mod redis_repo;

pub use app_config::{Config, StorageBackend};
pub use card_repo::PgCardRepository;
pub use database::DbClient;
pub use list_repo::PgListRepository;
pub use notification_repo::PgNotificationRepository;
pub use preference_repo::PgPreferenceRepository;
pub use project_repo::PgProjectRepository;
pub use redis_repo::RedisClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
