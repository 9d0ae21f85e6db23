use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic type of a card field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    RichText,
    Email,
    Url,
    Phone,
    Number,
    Percentage,
    Currency,
    Checkbox,
    Date,
    Datetime,
    Dropdown,
    Label,
    User,
    Card,
    Files,
}

/// One selectable option of a dropdown or label field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldItem {
    pub item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: i64,
    pub slug: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub items: Vec<FieldItem>,
}

impl Field {
    pub fn find_item(&self, name: &str) -> Option<&FieldItem> {
        self.items.iter().find(|i| i.item == name)
    }

    /// Path used by query filters to address this field inside card data.
    pub fn filter_path(&self) -> String {
        format!("card.data.{}", self.slug)
    }
}

/// JavaScript-style truthiness, which is how clients submit "no value".
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn item_string(value: &Value) -> String {
    if let Some(item) = value.get("item").filter(|i| is_truthy(i)) {
        return match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }

    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn items_to_strings(values: &[Value]) -> Value {
    Value::Array(values.iter().map(|v| Value::String(item_string(v))).collect())
}

/// Canonicalises a raw value before it is stored under a field's slug.
///
/// Returns `None` when the field should be cleared from the card data.
pub fn normalize_field_value(value: &Value, field: &Field) -> Option<Value> {
    let normalized = match field.field_type {
        FieldType::Dropdown | FieldType::Label | FieldType::User | FieldType::Card => match value {
            Value::Array(values) => Some(items_to_strings(values)),
            v if is_truthy(v) => Some(Value::Array(vec![Value::String(item_string(v))])),
            _ => None,
        },
        FieldType::Checkbox | FieldType::Number => match value {
            Value::Null => None,
            v => Some(v.clone()),
        },
        _ => match value {
            Value::Array(values) => Some(items_to_strings(values)),
            v if is_truthy(v) => Some(Value::String(item_string(v))),
            _ => None,
        },
    };

    match normalized {
        Some(Value::Array(values)) => match values.first() {
            Some(first) if is_truthy(first) => Some(Value::Array(values)),
            _ => None,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(field_type: FieldType) -> Field {
        Field {
            id: 1,
            slug: "status".to_string(),
            name: "Status".to_string(),
            field_type,
            items: vec![],
        }
    }

    #[test]
    fn test_dropdown_wraps_scalar_and_unwraps_items() {
        let f = field(FieldType::Dropdown);
        assert_eq!(normalize_field_value(&json!("Open"), &f), Some(json!(["Open"])));
        assert_eq!(
            normalize_field_value(&json!([{ "item": "Open" }, "Closed"]), &f),
            Some(json!(["Open", "Closed"]))
        );
        assert_eq!(normalize_field_value(&json!({ "item": "Done" }), &f), Some(json!(["Done"])));
    }

    #[test]
    fn test_user_ids_become_strings() {
        let f = field(FieldType::User);
        assert_eq!(normalize_field_value(&json!([3, 4]), &f), Some(json!(["3", "4"])));
        assert_eq!(normalize_field_value(&json!(12), &f), Some(json!(["12"])));
    }

    #[test]
    fn test_empty_values_are_cleared() {
        let f = field(FieldType::Label);
        assert_eq!(normalize_field_value(&json!([]), &f), None);
        assert_eq!(normalize_field_value(&json!([""]), &f), None);
        assert_eq!(normalize_field_value(&Value::Null, &f), None);
        assert_eq!(normalize_field_value(&json!(""), &field(FieldType::Text)), None);
    }

    #[test]
    fn test_checkbox_and_number_pass_through() {
        assert_eq!(normalize_field_value(&json!(false), &field(FieldType::Checkbox)), Some(json!(false)));
        assert_eq!(normalize_field_value(&json!(0), &field(FieldType::Number)), Some(json!(0)));
        assert_eq!(normalize_field_value(&Value::Null, &field(FieldType::Number)), None);
    }

    #[test]
    fn test_text_is_stringified() {
        let f = field(FieldType::Date);
        assert_eq!(
            normalize_field_value(&json!("2024-01-01T00:00:00Z"), &f),
            Some(json!("2024-01-01T00:00:00Z"))
        );
        assert_eq!(normalize_field_value(&json!(42), &field(FieldType::Text)), Some(json!("42")));
    }
}
