use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Admin => "admin",
            ProjectRole::Editor => "editor",
            ProjectRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(ProjectRole::Owner),
            "admin" => Some(ProjectRole::Admin),
            "editor" => Some(ProjectRole::Editor),
            "viewer" => Some(ProjectRole::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUser {
    pub user_id: i64,
    pub role: ProjectRole,
}

/// A tenant: every workspace, list and card lives inside one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub invite_code: String,
    #[serde(default)]
    pub users: Vec<ProjectUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_member(&self, user_id: i64) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub owner_id: i64,
    pub invite_code: String,
    pub users: Vec<ProjectUser>,
}

impl NewProject {
    /// A project owned by `owner_id`, who is also its first member.
    pub fn owned_by(name: String, owner_id: i64) -> Self {
        Self {
            name,
            owner_id,
            invite_code: generate_invite_code(),
            users: vec![ProjectUser {
                user_id: owner_id,
                role: ProjectRole::Owner,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

pub fn generate_invite_code() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_first_member() {
        let project = NewProject::owned_by("Acme".to_string(), 5);
        assert_eq!(project.users, vec![ProjectUser { user_id: 5, role: ProjectRole::Owner }]);
        assert_eq!(project.invite_code.len(), 12);
    }
}
