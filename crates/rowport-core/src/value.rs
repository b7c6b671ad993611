use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DATE_FORMAT, FieldKind, join_list};

/// A record keyed by target field name.
pub type Record = BTreeMap<String, FieldValue>;

/// Typed value of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<String>),
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Render the value as CSV cell text for a field of `kind`.
    pub fn to_cell(&self, kind: &FieldKind) -> String {
        match self {
            FieldValue::Number(value) => match kind {
                FieldKind::Number { scale: Some(scale) } => {
                    let scale = *scale as usize;
                    format!("{value:.scale$}")
                }
                _ => value.to_string(),
            },
            other => other.to_text(),
        }
    }

    /// Kind-independent text form, also used for duplicate keys.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(value) => value.clone(),
            FieldValue::Integer(value) => value.to_string(),
            FieldValue::Number(value) => value.to_string(),
            FieldValue::Boolean(value) => value.to_string(),
            FieldValue::Date(value) => value.format(DATE_FORMAT).to_string(),
            FieldValue::DateTime(value) => value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            FieldValue::List(items) => join_list(items),
            FieldValue::Json(value) => value.to_string(),
        }
    }

    /// Re-type a loosely typed value (as read back from a store) to `kind`.
    ///
    /// Values that cannot be converted are returned unchanged.
    pub fn conform(self, kind: &FieldKind) -> FieldValue {
        match self {
            FieldValue::Text(text) => match kind {
                FieldKind::Text | FieldKind::Reference { .. } => FieldValue::Text(text),
                _ => kind.coerce(&text).unwrap_or(FieldValue::Text(text)),
            },
            FieldValue::Integer(value) if matches!(kind, FieldKind::Number { .. }) => {
                FieldValue::Number(value as f64)
            }
            FieldValue::Number(value) if matches!(kind, FieldKind::Integer) && value.fract() == 0.0 => {
                FieldValue::Integer(value as i64)
            }
            FieldValue::Json(serde_json::Value::Array(items)) if matches!(kind, FieldKind::List) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::String(text) => text,
                        other => other.to_string(),
                    })
                    .collect();
                FieldValue::List(items)
            }
            other => other,
        }
    }

    /// Total order used for sorting exports; nulls sort last.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Null, _) => Ordering::Greater,
            (_, FieldValue::Null) => Ordering::Less,
            (FieldValue::Date(left), FieldValue::Date(right)) => left.cmp(right),
            (FieldValue::DateTime(left), FieldValue::DateTime(right)) => left.cmp(right),
            (FieldValue::Boolean(left), FieldValue::Boolean(right)) => left.cmp(right),
            (left, right) => match (left.as_f64(), right.as_f64()) {
                (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                _ => left.to_text().cmp(&right.to_text()),
            },
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// Canonical duplicate-detection key for a set of key values.
///
/// Returns `None` when any component is null; such rows never match.
pub fn duplicate_key(values: &[&FieldValue]) -> Option<String> {
    if values.is_empty() || values.iter().any(|value| value.is_null()) {
        return None;
    }
    let parts: Vec<String> = values.iter().map(|value| value.to_text()).collect();
    Some(parts.join("\u{1f}"))
}

/// Build the duplicate key of `record` over `key_fields`.
pub fn record_key(record: &Record, key_fields: &[String]) -> Option<String> {
    let mut values = Vec::with_capacity(key_fields.len());
    for field in key_fields {
        values.push(record.get(field)?);
    }
    duplicate_key(&values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_round_trip_through_default_coercion() {
        let cases = vec![
            (FieldKind::Number { scale: Some(2) }, FieldValue::Number(19.5)),
            (FieldKind::Integer, FieldValue::Integer(-42)),
            (
                FieldKind::Date,
                FieldValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap_or_default()),
            ),
            (FieldKind::Boolean, FieldValue::Boolean(false)),
            (
                FieldKind::List,
                FieldValue::List(vec!["red".to_string(), "blue; green".to_string()]),
            ),
            (
                FieldKind::DateTime,
                FieldValue::DateTime(
                    DateTime::from_timestamp_millis(1_700_000_000_123).unwrap_or_default(),
                ),
            ),
            (
                FieldKind::DateTime,
                FieldValue::DateTime(
                    DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap_or_default(),
                ),
            ),
            (
                FieldKind::Json,
                FieldValue::Json(serde_json::json!({"a": [1, "x"]})),
            ),
        ];

        for (kind, value) in cases {
            let cell = value.to_cell(&kind);
            assert_eq!(kind.coerce(&cell), Ok(value), "kind {}", kind.name());
        }
    }

    #[test]
    fn number_scale_is_stable() {
        let kind = FieldKind::Number { scale: Some(2) };
        assert_eq!(FieldValue::Number(3.0).to_cell(&kind), "3.00");
        assert_eq!(FieldValue::Number(3.0).to_cell(&FieldKind::Number { scale: None }), "3");
    }

    #[test]
    fn null_components_disable_duplicate_keys() {
        let email = FieldValue::from("a@example.com");
        assert_eq!(duplicate_key(&[&email]), Some("a@example.com".to_string()));
        assert_eq!(duplicate_key(&[&email, &FieldValue::Null]), None);
        assert_eq!(duplicate_key(&[]), None);
    }

    #[test]
    fn conform_retypes_textual_dates() {
        let value = FieldValue::from("2024-05-01").conform(&FieldKind::Date);
        assert_eq!(
            value,
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default())
        );
    }
}
