use serde::{Deserialize, Serialize};

use super::notifications::NotificationType;

/// Job name used for deferred notification processing.
pub const NOTIFY_JOB: &str = "notify";

/// A domain fact that may produce notifications for one or more users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub workspace_id: i64,
    /// User who caused the event. Never notified about their own action.
    #[serde(default)]
    pub actor_id: Option<i64>,
    pub recipient_ids: Vec<i64>,
    pub related_resource_id: String,
    pub related_resource_type: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl NotificationEvent {
    /// Recipients with the actor filtered out, in first-seen order.
    pub fn effective_recipients(&self) -> Vec<i64> {
        let mut seen = Vec::with_capacity(self.recipient_ids.len());
        for id in &self.recipient_ids {
            if Some(*id) == self.actor_id || seen.contains(id) {
                continue;
            }
            seen.push(*id);
        }
        seen
    }
}

/// Payload placed on the delayed queue: `{ "type": ..., "event": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationJob {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub event: NotificationEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(actor: Option<i64>, recipients: Vec<i64>) -> NotificationEvent {
        NotificationEvent {
            workspace_id: 1,
            actor_id: actor,
            recipient_ids: recipients,
            related_resource_id: "42".to_string(),
            related_resource_type: "card".to_string(),
            title: "Assigned".to_string(),
            message: "You were assigned".to_string(),
            color: None,
            url: None,
        }
    }

    #[test]
    fn test_actor_is_not_a_recipient() {
        assert_eq!(event(Some(2), vec![1, 2, 3, 1]).effective_recipients(), vec![1, 3]);
    }

    #[test]
    fn test_job_wire_shape() {
        let job = NotificationJob {
            notification_type: NotificationType::CardAssigned,
            event: event(None, vec![7]),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "CARD_ASSIGNED");
        assert_eq!(value["event"]["recipientIds"][0], 7);
    }
}
