use serde::{Deserialize, Serialize};

use crate::fields::Field;
use crate::filters::{merge_filters, QueryFilter, ViewFilter};

/// A fixed pipeline position (a Kanban column) inside a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListStage {
    pub id: i64,
    pub list_id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub order: f64,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    #[serde(default)]
    pub default_card_type_id: Option<i64>,
    #[serde(default)]
    pub list_stages: Vec<ListStage>,
}

impl List {
    pub fn find_stage(&self, stage_id: i64) -> Option<&ListStage> {
        self.list_stages.iter().find(|s| s.id == stage_id)
    }
}

/// How a list group partitions cards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListGroupOption {
    All,
    ListStage,
    Field,
}

/// A named partition of a list's cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListGroup {
    pub id: i64,
    pub list_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: ListGroupOption,
    /// Stage id for stage groups, user id for user-field groups.
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub field: Option<Field>,
    #[serde(default)]
    pub filter: Option<QueryFilter>,
    #[serde(default = "default_expanded")]
    pub is_expanded: bool,
    #[serde(default)]
    pub order: f64,
}

fn default_expanded() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sorting configured on a view. Any active sort disables manual ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortOption {
    pub key: String,
    pub order: SortDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewOptions {
    #[serde(default)]
    pub sort_by: Option<SortOption>,
    #[serde(default)]
    pub hide_completed: bool,
    #[serde(default)]
    pub hide_children: bool,
    #[serde(default)]
    pub group_by: Option<ListGroupOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: i64,
    pub list_id: i64,
    pub name: String,
    #[serde(default)]
    pub options: ViewOptions,
    #[serde(default)]
    pub filters: Option<ViewFilter>,
}

impl View {
    pub fn sort_by(&self) -> Vec<SortOption> {
        self.options.sort_by.iter().cloned().collect()
    }
}

/// Everything needed to fetch one group's cards inside a view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    pub filters: QueryFilter,
    pub hide_completed: bool,
    pub hide_children: bool,
    pub sort_by: Vec<SortOption>,
}

impl QueryConfig {
    pub fn for_group(view: &View, group: &ListGroup) -> Self {
        Self {
            filters: merge_filters(view.filters.as_ref(), group.filter.as_ref()),
            hide_completed: view.options.hide_completed,
            hide_children: view.options.hide_children,
            sort_by: view.sort_by(),
        }
    }

    /// Every card the group holds, in manual order, regardless of what a view hides.
    pub fn for_membership(group: &ListGroup) -> Self {
        Self {
            filters: merge_filters(None, group.filter.as_ref()),
            ..Self::default()
        }
    }
}
