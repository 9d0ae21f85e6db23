//! In-process implementations of the repository and delivery traits.
//!
//! Used by tests across the workspace and by the API when it runs without a
//! database (`TW_STORAGE=memory`).

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tilly_shared::{NotificationChannel, NotificationJob};
use uuid::Uuid;

use crate::cards::{Card, CardList, CardListUpdate};
use crate::feedback::{Feedback, FeedbackLevel};
use crate::fields::Field;
use crate::lists::{List, ListGroup, View};
use crate::notifications::{
    ChatMessenger, DeliveryError, DirectMessage, NewNotification, Notification, NotificationPush,
    NotificationQuery, NotificationQueue, NotificationUpdate,
};
use crate::preferences::{NotificationPreference, PreferenceUpsert};
use crate::projects::{NewProject, Project, ProjectUpdate};
use crate::repository::{
    CardListRepository, CardRepository, ListRepository, NotificationRepository, PreferenceRepository,
    ProjectRepository, RepoError, RepoResult,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Tables {
    cards: BTreeMap<i64, Card>,
    lists: BTreeMap<i64, List>,
    groups: BTreeMap<i64, ListGroup>,
    views: BTreeMap<i64, View>,
    fields: BTreeMap<i64, Field>,
    notifications: Vec<Notification>,
    preferences: Vec<NotificationPreference>,
    projects: BTreeMap<i64, Project>,
}

/// Every repository trait backed by one set of in-memory tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns a backend error. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Backend("writes are disabled".to_string()));
        }
        Ok(())
    }

    pub fn put_card(&self, card: Card) {
        lock(&self.tables).cards.insert(card.id, card);
    }

    pub fn put_list(&self, list: List) {
        lock(&self.tables).lists.insert(list.id, list);
    }

    pub fn put_group(&self, group: ListGroup) {
        lock(&self.tables).groups.insert(group.id, group);
    }

    pub fn put_view(&self, view: View) {
        lock(&self.tables).views.insert(view.id, view);
    }

    pub fn put_field(&self, field: Field) {
        lock(&self.tables).fields.insert(field.id, field);
    }

    pub fn card(&self, id: i64) -> Option<Card> {
        lock(&self.tables).cards.get(&id).cloned()
    }
}

#[async_trait]
impl CardRepository for MemoryStore {
    async fn get_card(&self, id: i64) -> RepoResult<Option<Card>> {
        Ok(self.card(id))
    }

    async fn list_cards_in_list(&self, list_id: i64) -> RepoResult<Vec<Card>> {
        Ok(lock(&self.tables)
            .cards
            .values()
            .filter(|c| c.card_lists.iter().any(|cl| cl.list_id == list_id))
            .cloned()
            .collect())
    }

    async fn update_card_data(&self, id: i64, data: &Map<String, Value>) -> RepoResult<Option<Card>> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        Ok(tables.cards.get_mut(&id).map(|card| {
            card.data = data.clone();
            card.updated_at = Utc::now();
            card.clone()
        }))
    }
}

#[async_trait]
impl CardListRepository for MemoryStore {
    async fn get_card_list(&self, id: i64) -> RepoResult<Option<CardList>> {
        Ok(lock(&self.tables)
            .cards
            .values()
            .flat_map(|c| c.card_lists.iter())
            .find(|cl| cl.id == id)
            .cloned())
    }

    async fn update_card_list(&self, id: i64, update: &CardListUpdate) -> RepoResult<Option<CardList>> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        let row = tables
            .cards
            .values_mut()
            .flat_map(|c| c.card_lists.iter_mut())
            .find(|cl| cl.id == id);
        Ok(row.map(|cl| {
            if let Some(stage) = update.list_stage_id {
                cl.list_stage_id = stage;
            }
            if let Some(order) = update.order {
                cl.order = order;
            }
            cl.clone()
        }))
    }
}

#[async_trait]
impl ListRepository for MemoryStore {
    async fn get_list(&self, id: i64) -> RepoResult<Option<List>> {
        Ok(lock(&self.tables).lists.get(&id).cloned())
    }

    async fn get_group(&self, id: i64) -> RepoResult<Option<ListGroup>> {
        Ok(lock(&self.tables).groups.get(&id).cloned())
    }

    async fn set_group_expanded(&self, id: i64, is_expanded: bool) -> RepoResult<Option<ListGroup>> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        Ok(tables.groups.get_mut(&id).map(|g| {
            g.is_expanded = is_expanded;
            g.clone()
        }))
    }

    async fn get_view(&self, id: i64) -> RepoResult<Option<View>> {
        Ok(lock(&self.tables).views.get(&id).cloned())
    }

    async fn get_field(&self, id: i64) -> RepoResult<Option<Field>> {
        Ok(lock(&self.tables).fields.get(&id).cloned())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert(&self, data: &NewNotification) -> RepoResult<Notification> {
        self.check_writable()?;
        let notification = Notification {
            id: Uuid::new_v4(),
            notification_type: data.notification_type,
            recipient_id: data.recipient_id,
            workspace_id: data.workspace_id,
            related_resource_id: data.related_resource_id.clone(),
            related_resource_type: data.related_resource_type.clone(),
            message: data.message.clone(),
            color: data.color.clone(),
            is_read: data.is_read,
            created_at: Utc::now(),
        };
        lock(&self.tables).notifications.push(notification.clone());
        Ok(notification)
    }

    async fn find_all(&self, query: &NotificationQuery) -> RepoResult<Vec<Notification>> {
        let tables = lock(&self.tables);
        let mut found: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == query.recipient_id && n.workspace_id == query.workspace_id)
            .filter(|n| query.is_read.map_or(true, |r| n.is_read == r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_one(&self, id: Uuid) -> RepoResult<Option<Notification>> {
        Ok(lock(&self.tables).notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn update(&self, id: Uuid, update: &NotificationUpdate) -> RepoResult<Option<Notification>> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        Ok(tables.notifications.iter_mut().find(|n| n.id == id).map(|n| {
            if let Some(is_read) = update.is_read {
                n.is_read = is_read;
            }
            if let Some(message) = &update.message {
                n.message = message.clone();
            }
            n.clone()
        }))
    }

    async fn mark_all_as_read(&self, recipient_id: i64) -> RepoResult<u64> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        let mut changed = 0;
        for n in tables
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
        {
            n.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        let before = tables.notifications.len();
        tables.notifications.retain(|n| n.id != id);
        Ok(tables.notifications.len() < before)
    }
}

#[async_trait]
impl PreferenceRepository for MemoryStore {
    async fn find(&self, user_id: i64, channel: NotificationChannel) -> RepoResult<Option<NotificationPreference>> {
        Ok(lock(&self.tables)
            .preferences
            .iter()
            .find(|p| p.user_id == user_id && p.channel == channel)
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<NotificationPreference>> {
        Ok(lock(&self.tables)
            .preferences
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, preference: &PreferenceUpsert) -> RepoResult<NotificationPreference> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        let now = Utc::now();
        if let Some(existing) = tables
            .preferences
            .iter_mut()
            .find(|p| p.user_id == preference.user_id && p.channel == preference.channel)
        {
            existing.enabled = preference.enabled;
            existing.config = preference.config.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = NotificationPreference {
            id: Uuid::new_v4(),
            user_id: preference.user_id,
            channel: preference.channel,
            enabled: preference.enabled,
            config: preference.config.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.preferences.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl ProjectRepository for MemoryStore {
    async fn list_for_user(&self, user_id: i64) -> RepoResult<Vec<Project>> {
        Ok(lock(&self.tables)
            .projects
            .values()
            .filter(|p| p.is_member(user_id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> RepoResult<Option<Project>> {
        Ok(lock(&self.tables).projects.get(&id).cloned())
    }

    async fn find_by_invite_code(&self, invite_code: &str) -> RepoResult<Option<Project>> {
        Ok(lock(&self.tables)
            .projects
            .values()
            .find(|p| p.invite_code == invite_code)
            .cloned())
    }

    async fn create(&self, project: &NewProject) -> RepoResult<Project> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        let id = tables.projects.keys().next_back().map_or(1, |last| last + 1);
        let now = Utc::now();
        let created = Project {
            id,
            name: project.name.clone(),
            owner_id: project.owner_id,
            invite_code: project.invite_code.clone(),
            users: project.users.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: &ProjectUpdate) -> RepoResult<Option<Project>> {
        self.check_writable()?;
        let mut tables = lock(&self.tables);
        Ok(tables.projects.get_mut(&id).map(|p| {
            if let Some(name) = &update.name {
                p.name = name.clone();
            }
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        self.check_writable()?;
        Ok(lock(&self.tables).projects.remove(&id).is_some())
    }
}

/// Push gateway that records what it was asked to deliver.
#[derive(Default)]
pub struct RecordingPush {
    pushed: Mutex<Vec<(i64, Notification)>>,
}

impl RecordingPush {
    pub fn pushed(&self) -> Vec<(i64, Notification)> {
        lock(&self.pushed).clone()
    }
}

impl NotificationPush for RecordingPush {
    fn push(&self, recipient_id: i64, notification: &Notification) -> usize {
        lock(&self.pushed).push((recipient_id, notification.clone()));
        1
    }
}

/// Chat messenger that records direct messages, optionally failing every send.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<DirectMessage>>,
    failure: Mutex<Option<String>>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<DirectMessage> {
        lock(&self.sent).clone()
    }

    pub fn fail_with(&self, reason: &str) {
        *lock(&self.failure) = Some(reason.to_string());
    }
}

#[async_trait]
impl ChatMessenger for RecordingChat {
    async fn send_dm(&self, message: &DirectMessage) -> Result<(), DeliveryError> {
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(DeliveryError::Unavailable(reason));
        }
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<(NotificationJob, Duration)>>,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<(NotificationJob, Duration)> {
        lock(&self.jobs).clone()
    }
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, job: &NotificationJob, delay: Duration) -> Result<(), DeliveryError> {
        lock(&self.jobs).push((job.clone(), delay));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    messages: Mutex<Vec<(FeedbackLevel, String)>>,
}

impl RecordingFeedback {
    pub fn messages(&self) -> Vec<(FeedbackLevel, String)> {
        lock(&self.messages).clone()
    }
}

impl Feedback for RecordingFeedback {
    fn notify(&self, level: FeedbackLevel, message: &str) {
        lock(&self.messages).push((level, message.to_string()));
    }
}
