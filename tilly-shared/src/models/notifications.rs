use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of domain fact a notification reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    CardAssigned,
    CardUnassigned,
    Mention,
    Comment,
    StageChanged,
    DueDateReminder,
}

/// Delivery channel a preference row gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Slack,
    Email,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::InApp => "in_app",
            NotificationChannel::Slack => "slack",
            NotificationChannel::Email => "email",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_app" => Some(NotificationChannel::InApp),
            "slack" => Some(NotificationChannel::Slack),
            "email" => Some(NotificationChannel::Email),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel specific switches stored as JSON next to the `enabled` flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceConfig {
    #[serde(default)]
    pub is_dm_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_wire_names() {
        assert_eq!(serde_json::to_string(&NotificationChannel::InApp).unwrap(), "\"in_app\"");
        assert_eq!(NotificationChannel::parse("slack"), Some(NotificationChannel::Slack));
        assert_eq!(NotificationChannel::parse("sms"), None);
    }

    #[test]
    fn test_empty_config_defaults_to_dm_disabled() {
        let config: PreferenceConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.is_dm_enabled);
    }
}
