use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tilly_api::slack::{DisabledMessenger, SlackMessenger};
use tilly_api::state::{AppState, AuthConfig, Repositories};
use tilly_api::{app, worker};
use tilly_core::memory::MemoryStore;
use tilly_core::notifications::{ChatMessenger, NotificationQueue};
use tilly_store::{Config, DbClient, RedisClient, StorageBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilly_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    config.validate()?;
    tracing::info!("Starting tillywork API ({:?}) on port {}", config.node_env, config.server.port);

    let repos = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            Repositories::memory(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database, config.enable_query_logging)
                .await
                .context("Failed to connect to postgres")?;
            db.migrate().await?;
            Repositories::postgres(db.pool)
        }
    };

    let redis = match config.redis.url() {
        Some(url) => Some(Arc::new(
            RedisClient::new(&url).await.context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::info!("No Redis configured, notifications are processed inline");
            None
        }
    };

    let chat: Arc<dyn ChatMessenger> = match &config.slack.bot_token {
        Some(token) if !token.is_blank() => Arc::new(SlackMessenger::new(&config.slack.api_url, token.clone())?),
        _ => Arc::new(DisabledMessenger),
    };

    let secret = config
        .secret_key
        .clone()
        .context("TW_SECRET_KEY is required")?;

    let app_state = AppState::new(
        repos,
        chat,
        redis.clone().map(|r| r as Arc<dyn NotificationQueue>),
        AuthConfig {
            secret,
            expiration: config.jwt_expiration_seconds,
        },
        config.enable_req_body_logging,
    );

    if let Some(redis) = redis {
        tokio::spawn(worker::start_notification_worker(
            redis,
            app_state.notifications.clone(),
            Duration::from_millis(config.worker.poll_interval_ms),
            config.worker.batch_size,
            Duration::from_millis(config.worker.lease_ms),
        ));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
