//! Query filters attached to views and list groups.
//!
//! Filters arrive as `{ "where": { "and": [...], "or": [...] } }` where each
//! condition is either a field comparison or a nested group. Views carry two
//! sets (quick and advanced) that are combined with a group's own filter when
//! the group's cards are queried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::fields::is_truthy;

/// Comparison operator of a [`FieldFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    Nin,
    Like,
    Nlike,
    Between,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn parse(value: &str) -> Option<Self> {
        let op = match value {
            "eq" => FilterOperator::Eq,
            "ne" => FilterOperator::Ne,
            "lt" => FilterOperator::Lt,
            "gt" => FilterOperator::Gt,
            "lte" => FilterOperator::Lte,
            "gte" => FilterOperator::Gte,
            "in" => FilterOperator::In,
            "nin" => FilterOperator::Nin,
            "like" => FilterOperator::Like,
            "nlike" => FilterOperator::Nlike,
            "between" => FilterOperator::Between,
            "isNull" => FilterOperator::IsNull,
            "isNotNull" => FilterOperator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }
}

/// A single comparison against a card property such as `card.data.status`.
///
/// The operator is kept as the raw string so that filters written by newer
/// clients still deserialize; unknown operators never match a group value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, operator: &str, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.to_string(),
            value,
        }
    }

    pub fn operator(&self) -> Option<FilterOperator> {
        FilterOperator::parse(&self.operator)
    }

    fn matches(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        let Some(op) = self.operator() else {
            tracing::debug!("Ignoring filter with unknown operator {}", self.operator);
            return true;
        };

        let actual = lookup(&self.field).filter(|v| !v.is_null());
        match op {
            FilterOperator::Eq => actual.is_some_and(|a| loose_contains(&a, &self.value)),
            FilterOperator::Ne => !actual.is_some_and(|a| loose_contains(&a, &self.value)),
            FilterOperator::Lt => compare(actual.as_ref(), &self.value) == Some(Ordering::Less),
            FilterOperator::Gt => compare(actual.as_ref(), &self.value) == Some(Ordering::Greater),
            FilterOperator::Lte => matches!(
                compare(actual.as_ref(), &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Gte => matches!(
                compare(actual.as_ref(), &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::In => actual.is_some_and(|a| any_in(&a, &self.value)),
            FilterOperator::Nin => !actual.is_some_and(|a| any_in(&a, &self.value)),
            FilterOperator::Like => actual.is_some_and(|a| like(&a, &self.value)),
            FilterOperator::Nlike => !actual.is_some_and(|a| like(&a, &self.value)),
            FilterOperator::Between => match self.value.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    matches!(
                        compare(actual.as_ref(), low),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        compare(actual.as_ref(), high),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                _ => false,
            },
            FilterOperator::IsNull => !actual.as_ref().is_some_and(has_content),
            FilterOperator::IsNotNull => actual.as_ref().is_some_and(has_content),
        }
    }
}

/// Either a comparison or a nested group, as found inside `and`/`or` arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterCondition {
    Field(FieldFilter),
    Group(FilterGroup),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<FilterCondition>,
}

impl FilterGroup {
    pub fn matches(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        let all = self.and.iter().all(|c| c.matches(lookup));
        let any = self.or.is_empty() || self.or.iter().any(|c| c.matches(lookup));
        all && any
    }
}

impl FilterCondition {
    fn matches(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        match self {
            FilterCondition::Field(f) => f.matches(lookup),
            FilterCondition::Group(g) => g.matches(lookup),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryFilter {
    #[serde(rename = "where", default)]
    pub where_: FilterGroup,
}

impl QueryFilter {
    pub fn from_conditions(and: Vec<FilterCondition>) -> Self {
        Self {
            where_: FilterGroup { and, or: vec![] },
        }
    }

    /// First top-level `and` comparison addressing `field`.
    pub fn find_field_condition(&self, field: &str) -> Option<&FieldFilter> {
        self.where_.and.iter().find_map(|c| match c {
            FilterCondition::Field(f) if f.field == field => Some(f),
            _ => None,
        })
    }

    pub fn matches(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        self.where_.matches(lookup)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewWhere {
    #[serde(default)]
    pub quick: Option<FilterGroup>,
    #[serde(default)]
    pub advanced: Option<FilterGroup>,
}

/// Filters configured on a view: quick toggles plus the advanced builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewFilter {
    #[serde(rename = "where", default)]
    pub where_: ViewWhere,
}

/// Effective filter for a group rendered inside a view.
///
/// The view's quick and advanced `and` conditions come first, followed by the
/// group's own conditions; the group's `or` branch is kept as is.
pub fn merge_filters(view: Option<&ViewFilter>, group: Option<&QueryFilter>) -> QueryFilter {
    let Some(view) = view else {
        return group.cloned().unwrap_or_default();
    };

    let mut and: Vec<FilterCondition> = Vec::new();
    for part in [&view.where_.quick, &view.where_.advanced].into_iter().flatten() {
        and.extend(part.and.iter().cloned());
    }

    let mut or = Vec::new();
    if let Some(group) = group {
        and.extend(group.where_.and.iter().cloned());
        or.extend(group.where_.or.iter().cloned());
    }

    QueryFilter {
        where_: FilterGroup { and, or },
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => as_text(a) == as_text(b),
    }
}

/// Array-valued fields (dropdown, label, user) match when any element does.
fn loose_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|i| loose_eq(i, expected)),
        other => loose_eq(other, expected),
    }
}

fn any_in(actual: &Value, expected: &Value) -> bool {
    let Some(options) = expected.as_array() else {
        return loose_contains(actual, expected);
    };
    options.iter().any(|o| loose_contains(actual, o))
}

fn like(actual: &Value, expected: &Value) -> bool {
    let needle = as_text(expected).to_lowercase();
    match actual {
        Value::Array(items) => items.iter().any(|i| as_text(i).to_lowercase().contains(&needle)),
        other => as_text(other).to_lowercase().contains(&needle),
    }
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let actual = match actual? {
        Value::Array(items) => items.first()?,
        other => other,
    };

    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a.partial_cmp(&b);
    }
    match (parse_time(actual), parse_time(expected)) {
        (Some(a), Some(b)) => return Some(a.cmp(&b)),
        // Unresolved operands such as ":startOfDay" never match a date.
        (Some(_), None) | (None, Some(_)) => return None,
        (None, None) => {}
    }
    if !is_truthy(actual) && !is_truthy(expected) {
        return None;
    }
    Some(as_text(actual).cmp(&as_text(expected)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup_from(data: Value) -> impl Fn(&str) -> Option<Value> {
        move |path: &str| {
            path.strip_prefix("card.data.")
                .and_then(|slug| data.get(slug).cloned())
        }
    }

    #[test]
    fn test_deserialize_nested_filter() {
        let raw = json!({
            "where": {
                "and": [
                    { "field": "card.data.due", "operator": "lt", "value": "2024-01-01T00:00:00Z" },
                    { "or": [ { "field": "card.data.status", "operator": "eq", "value": "Open" } ] }
                ]
            }
        });
        let filter: QueryFilter = serde_json::from_value(raw).unwrap();
        assert_eq!(filter.where_.and.len(), 2);
        assert!(matches!(filter.where_.and[1], FilterCondition::Group(_)));
        assert_eq!(
            filter.find_field_condition("card.data.due").and_then(|f| f.operator()),
            Some(FilterOperator::Lt)
        );
    }

    #[test]
    fn test_array_fields_match_any_element() {
        let filter = QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(
            "card.data.labels",
            "in",
            json!(["Bug", "Urgent"]),
        ))]);
        assert!(filter.matches(&lookup_from(json!({ "labels": ["Urgent"] }))));
        assert!(!filter.matches(&lookup_from(json!({ "labels": ["Chore"] }))));
        assert!(!filter.matches(&lookup_from(json!({}))));
    }

    #[test]
    fn test_date_comparisons() {
        let filter = QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(
            "card.data.due",
            "between",
            json!(["2024-03-01T00:00:00Z", "2024-03-31T23:59:59Z"]),
        ))]);
        assert!(filter.matches(&lookup_from(json!({ "due": "2024-03-10T12:00:00+02:00" }))));
        assert!(!filter.matches(&lookup_from(json!({ "due": "2024-04-01T00:00:00Z" }))));
    }

    #[test]
    fn test_date_against_placeholder_never_matches() {
        let dated = lookup_from(json!({ "due": "2024-03-10T12:00:00Z" }));
        for operator in ["lt", "gt", "lte", "gte"] {
            let filter = QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(
                "card.data.due",
                operator,
                json!(":startOfDay"),
            ))]);
            assert!(!filter.matches(&dated), "{} matched a placeholder", operator);
        }
    }

    #[test]
    fn test_null_checks() {
        let is_null = QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(
            "card.data.assignee",
            "isNull",
            Value::Null,
        ))]);
        assert!(is_null.matches(&lookup_from(json!({ "assignee": [] }))));
        assert!(!is_null.matches(&lookup_from(json!({ "assignee": ["4"] }))));
    }

    #[test]
    fn test_merge_keeps_view_conditions_first() {
        let view: ViewFilter = serde_json::from_value(json!({
            "where": {
                "quick": { "and": [ { "field": "card.data.a", "operator": "eq", "value": 1 } ] },
                "advanced": { "and": [ { "field": "card.data.b", "operator": "eq", "value": 2 } ] }
            }
        }))
        .unwrap();
        let group = QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(
            "card.data.c",
            "eq",
            json!(3),
        ))]);

        let merged = merge_filters(Some(&view), Some(&group));
        let fields: Vec<_> = merged
            .where_
            .and
            .iter()
            .filter_map(|c| match c {
                FilterCondition::Field(f) => Some(f.field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["card.data.a", "card.data.b", "card.data.c"]);
        assert_eq!(merge_filters(None, Some(&group)), group);
    }
}
