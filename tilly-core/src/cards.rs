use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::lists::{List, QueryConfig, SortDirection, SortOption};

/// Membership of a card in a list: its stage and its position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardList {
    pub id: i64,
    pub card_id: i64,
    pub list_id: i64,
    pub list_stage_id: i64,
    pub order: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub workspace_id: i64,
    #[serde(default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub card_lists: Vec<CardList>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Membership in `list_id`, falling back to the first membership.
    pub fn card_list_for(&self, list_id: i64) -> Option<&CardList> {
        self.card_lists
            .iter()
            .find(|cl| cl.list_id == list_id)
            .or_else(|| self.card_lists.first())
    }

    pub fn order_in(&self, list_id: i64) -> Option<f64> {
        self.card_list_for(list_id).map(|cl| cl.order)
    }

    /// Stores a normalised field value, removing the key when it is absent.
    pub fn set_field(&mut self, slug: &str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.data.insert(slug.to_string(), v);
            }
            None => {
                self.data.remove(slug);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Resolves a filter path (`card.data.<slug>`, `listStage.id`, ...) for this card.
    pub fn filter_value(&self, list_id: i64, path: &str) -> Option<Value> {
        if let Some(slug) = path.strip_prefix("card.data.") {
            return self.data.get(slug).cloned();
        }
        match path {
            "listStage.id" | "card.cardLists.listStageId" => {
                self.card_list_for(list_id).map(|cl| Value::from(cl.list_stage_id))
            }
            "card.parentId" => self.parent_id.map(Value::from),
            "card.createdAt" => Some(Value::String(self.created_at.to_rfc3339())),
            "card.updatedAt" => Some(Value::String(self.updated_at.to_rfc3339())),
            _ => None,
        }
    }
}

/// Partial update of a card's list membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardListUpdate {
    #[serde(default)]
    pub list_stage_id: Option<i64>,
    #[serde(default)]
    pub order: Option<f64>,
}

/// Compares two cards by their manual order, ties broken by id.
pub fn by_manual_order(list_id: i64) -> impl Fn(&Card, &Card) -> Ordering {
    move |a, b| {
        let oa = a.order_in(list_id).unwrap_or(f64::MAX);
        let ob = b.order_in(list_id).unwrap_or(f64::MAX);
        oa.partial_cmp(&ob).unwrap_or(Ordering::Equal).then(a.id.cmp(&b.id))
    }
}

fn sort_value(card: &Card, list_id: i64, sort: &SortOption) -> Option<Value> {
    let path = if sort.key.contains('.') {
        sort.key.clone()
    } else {
        format!("card.data.{}", sort.key)
    };
    card.filter_value(list_id, &path)
}

fn compare_sort_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.partial_cmp(&fy).unwrap_or(Ordering::Equal),
            _ => x.to_string().cmp(&y.to_string()),
        },
    }
}

/// Cards of `list` that belong to a group, in display order.
///
/// Without a sort option the manual `order` applies; otherwise cards are
/// sorted by the configured key and manual order only breaks ties.
pub fn group_members(cards: Vec<Card>, list: &List, config: &QueryConfig) -> Vec<Card> {
    let mut members: Vec<Card> = cards
        .into_iter()
        .filter(|card| card.card_lists.iter().any(|cl| cl.list_id == list.id))
        .filter(|card| !(config.hide_children && card.parent_id.is_some()))
        .filter(|card| {
            if !config.hide_completed {
                return true;
            }
            card.card_list_for(list.id)
                .and_then(|cl| list.find_stage(cl.list_stage_id))
                .map(|stage| !stage.is_completed)
                .unwrap_or(true)
        })
        .filter(|card| config.filters.matches(&|path: &str| card.filter_value(list.id, path)))
        .collect();

    let manual = by_manual_order(list.id);
    members.sort_by(|a, b| {
        let keyed = config.sort_by.iter().fold(Ordering::Equal, |acc, sort| {
            acc.then_with(|| {
                let ord = compare_sort_values(
                    sort_value(a, list.id, sort).as_ref(),
                    sort_value(b, list.id, sort).as_ref(),
                );
                match sort.order {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
        });
        keyed.then_with(|| manual(a, b))
    });
    members
}
