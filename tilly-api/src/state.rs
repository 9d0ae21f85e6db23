use sqlx::PgPool;
use std::sync::Arc;
use tilly_core::feedback::TracingFeedback;
use tilly_core::memory::MemoryStore;
use tilly_core::notifications::{ChatMessenger, NotificationQueue, NotificationService};
use tilly_core::preferences::PreferenceService;
use tilly_core::reorder::ReorderService;
use tilly_core::repository::{
    CardListRepository, CardRepository, ListRepository, NotificationRepository, PreferenceRepository,
    ProjectRepository,
};
use tilly_shared::Masked;
use tilly_store::{
    PgCardRepository, PgListRepository, PgNotificationRepository, PgPreferenceRepository, PgProjectRepository,
};

use crate::gateway::NotificationGateway;

const PUSH_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
    pub expiration: u64,
}

/// One implementation per repository trait.
#[derive(Clone)]
pub struct Repositories {
    pub cards: Arc<dyn CardRepository>,
    pub card_lists: Arc<dyn CardListRepository>,
    pub lists: Arc<dyn ListRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub projects: Arc<dyn ProjectRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        let cards = Arc::new(PgCardRepository::new(pool.clone()));
        Self {
            cards: cards.clone(),
            card_lists: cards,
            lists: Arc::new(PgListRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            preferences: Arc::new(PgPreferenceRepository::new(pool.clone())),
            projects: Arc::new(PgProjectRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            cards: store.clone(),
            card_lists: store.clone(),
            lists: store.clone(),
            notifications: store.clone(),
            preferences: store.clone(),
            projects: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectRepository>,
    pub notifications: Arc<NotificationService>,
    pub reorder: ReorderService,
    pub gateway: NotificationGateway,
    pub auth: AuthConfig,
    pub log_request_bodies: bool,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        chat: Arc<dyn ChatMessenger>,
        queue: Option<Arc<dyn NotificationQueue>>,
        auth: AuthConfig,
        log_request_bodies: bool,
    ) -> Self {
        let gateway = NotificationGateway::new(PUSH_CHANNEL_CAPACITY);

        let mut notifications = NotificationService::new(
            repos.notifications,
            PreferenceService::new(repos.preferences),
            Arc::new(gateway.clone()),
            chat,
        );
        if let Some(queue) = queue {
            notifications = notifications.with_queue(queue);
        }

        let reorder = ReorderService::new(repos.cards, repos.card_lists, repos.lists, Arc::new(TracingFeedback));

        Self {
            projects: repos.projects,
            notifications: Arc::new(notifications),
            reorder,
            gateway,
            auth,
            log_request_bodies,
        }
    }
}
