use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Date format used for `date` cells on both import and export.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Separator used when a `list` field is rendered into a single cell.
pub const LIST_SEPARATOR: char = ';';

/// Closed set of field kinds an entity schema can declare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    /// Decimal number; `scale` fixes the number of exported decimals.
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<u32>,
    },
    Date,
    DateTime,
    Boolean,
    /// Text restricted to a fixed set of canonical values.
    Enum { values: Vec<String> },
    /// Business key of a record in another entity.
    Reference { entity: String },
    List,
    Json,
}

impl FieldKind {
    /// Short identifier used in messages and reports.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Number { .. } => "number",
            FieldKind::Date => "date",
            FieldKind::DateTime => "date_time",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Reference { .. } => "reference",
            FieldKind::List => "list",
            FieldKind::Json => "json",
        }
    }

    /// Allowed values for enum kinds.
    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            FieldKind::Enum { values } => Some(values),
            _ => None,
        }
    }

    /// Default coercion of a raw cell into a typed value.
    ///
    /// Blank cells always coerce to [`FieldValue::Null`]; required-ness is
    /// enforced by the caller. This is the inverse of
    /// [`FieldValue::to_cell`] for every kind.
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(FieldValue::Null);
        }

        match self {
            FieldKind::Text | FieldKind::Reference { .. } => Ok(FieldValue::Text(value.to_string())),
            FieldKind::Integer => value
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("invalid integer '{value}'")),
            FieldKind::Number { .. } => parse_number(value).map(FieldValue::Number),
            FieldKind::Date => parse_date(value).map(FieldValue::Date),
            FieldKind::DateTime => parse_date_time(value).map(FieldValue::DateTime),
            FieldKind::Boolean => parse_bool(value).map(FieldValue::Boolean),
            FieldKind::Enum { values } => match_enum(value, values).map(FieldValue::Text),
            FieldKind::List => Ok(FieldValue::List(split_list(value))),
            FieldKind::Json => serde_json::from_str(value)
                .map(FieldValue::Json)
                .map_err(|err| format!("invalid json: {err}")),
        }
    }
}

pub fn parse_number(value: &str) -> Result<f64, String> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(format!("invalid number '{value}'")),
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y/%m/%d"))
        .map_err(|_| format!("invalid date '{value}' (expected YYYY-MM-DD)"))
}

pub fn parse_date_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(format!("invalid date-time '{value}' (expected RFC 3339)"))
}

/// Parse common truthy/falsy tokens.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(format!("invalid boolean '{value}'")),
    }
}

/// Match a value against an allowed set, returning the canonical spelling.
///
/// Matching ignores case and treats spaces, hyphens and underscores alike.
pub fn match_enum(value: &str, allowed: &[String]) -> Result<String, String> {
    let wanted = normalize_token(value);
    allowed
        .iter()
        .find(|candidate| normalize_token(candidate) == wanted)
        .cloned()
        .ok_or_else(|| {
            format!(
                "invalid value '{value}' (allowed: {})",
                allowed.join(", ")
            )
        })
}

fn normalize_token(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| match ch {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Split a list cell on unescaped separators; `\;` and `\\` are literals.
pub fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            LIST_SEPARATOR => items.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    items.push(current);
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render list items into one cell, escaping separators inside items.
pub fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| {
            item.replace('\\', "\\\\")
                .replace(LIST_SEPARATOR, "\\;")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cells_coerce_to_null_for_every_kind() {
        for kind in [
            FieldKind::Text,
            FieldKind::Integer,
            FieldKind::Date,
            FieldKind::Boolean,
            FieldKind::Json,
        ] {
            assert_eq!(kind.coerce("   "), Ok(FieldValue::Null));
        }
    }

    #[test]
    fn enum_matching_returns_canonical_value() {
        let kind = FieldKind::Enum {
            values: vec!["In Progress".to_string(), "done".to_string()],
        };
        assert_eq!(
            kind.coerce("in_progress"),
            Ok(FieldValue::Text("In Progress".to_string()))
        );
        assert!(kind.coerce("blocked").is_err());
    }

    #[test]
    fn boolean_tokens_are_case_insensitive() {
        assert_eq!(parse_bool("YES"), Ok(true));
        assert_eq!(parse_bool("off"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn date_time_accepts_plain_dates() {
        let parsed = parse_date_time("2024-03-01").expect("date only");
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn list_items_keep_escaped_separators() {
        let items = vec!["a;b".to_string(), "c\\d".to_string(), "e".to_string()];
        let cell = join_list(&items);
        assert_eq!(cell, "a\\;b; c\\\\d; e");
        assert_eq!(split_list(&cell), items);
        assert_eq!(split_list("red; blue;;"), vec!["red".to_string(), "blue".to_string()]);
    }

    #[test]
    fn number_rejects_non_finite_values() {
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("inf").is_err());
        assert_eq!(parse_number("12.50"), Ok(12.5));
    }
}
