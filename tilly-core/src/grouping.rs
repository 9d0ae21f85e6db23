//! Derives what membership in a list group means for a card.
//!
//! A stage group maps to one of the list's stages. A field group maps to a
//! value of that field: the option named like the group for dropdowns and
//! labels, the grouped user for user fields, and a day boundary for date
//! fields (derived from the group's own filter). The value pre-fills cards
//! created inside the group and is written to cards dragged into it.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::FieldType;
use crate::filters::FilterOperator;
use crate::lists::{List, ListGroup, ListGroupOption, ListStage, QueryConfig, View};

/// Stage a card lands in when created or dropped inside `group`.
pub fn resolve_group_stage(list: &List, group: &ListGroup) -> Option<ListStage> {
    if group.group_type != ListGroupOption::ListStage {
        return None;
    }
    let stage_id = group.entity_id?;
    list.find_stage(stage_id).cloned()
}

/// Field value implied by membership in a field group.
///
/// `now` fixes both the reference day and the local timezone used for date
/// groups.
pub fn resolve_group_value<Tz: TimeZone>(group: &ListGroup, now: &DateTime<Tz>) -> Option<Value> {
    if group.group_type != ListGroupOption::Field {
        return None;
    }
    let field = group.field.as_ref()?;

    match field.field_type {
        FieldType::Dropdown | FieldType::Label => field
            .find_item(&group.name)
            .map(|item| Value::String(item.item.clone())),
        FieldType::User => group.entity_id.map(Value::from),
        FieldType::Date | FieldType::Datetime => {
            let condition = group.filter.as_ref()?.find_field_condition(&field.filter_path())?;
            let offset_days = match condition.operator()? {
                FilterOperator::Lt => -1,
                FilterOperator::Gt => 1,
                FilterOperator::Between => 0,
                _ => return None,
            };
            end_of_day(now, offset_days).map(|t| Value::String(format_utc(&t)))
        }
        _ => None,
    }
}

/// 23:59:59 on the local day of `now`, shifted by whole days.
fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>, offset_days: i64) -> Option<DateTime<Utc>> {
    let end = NaiveTime::from_hms_opt(23, 59, 59)?;
    let today = now
        .timezone()
        .from_local_datetime(&now.date_naive().and_time(end))
        .earliest()?;
    Some(today.with_timezone(&Utc) + Duration::hours(24 * offset_days))
}

/// Query used to fetch the cards of `group` as rendered in `view`.
pub fn group_query(view: &View, group: &ListGroup) -> QueryConfig {
    QueryConfig::for_group(view, group)
}

/// Canonical timestamp format for date field values.
pub fn format_utc(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Initial state of a card created from inside a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardPrefill {
    pub list_id: i64,
    pub card_type_id: Option<i64>,
    pub list_stage: Option<ListStage>,
    pub data: Map<String, Value>,
}

pub fn new_card_prefill<Tz: TimeZone>(list: &List, group: &ListGroup, now: &DateTime<Tz>) -> CardPrefill {
    let mut data = Map::new();

    if let (ListGroupOption::Field, Some(field)) = (group.group_type, group.field.as_ref()) {
        let value = resolve_group_value(group, now);
        match field.field_type {
            FieldType::Dropdown | FieldType::Label | FieldType::User => {
                if let Some(v) = value {
                    data.insert(field.slug.clone(), Value::Array(vec![v]));
                }
            }
            FieldType::Date | FieldType::Datetime => {
                if let Some(v) = value {
                    data.insert(field.slug.clone(), v);
                }
            }
            _ => {}
        }
    }

    CardPrefill {
        list_id: list.id,
        card_type_id: list.default_card_type_id,
        list_stage: resolve_group_stage(list, group),
        data,
    }
}
