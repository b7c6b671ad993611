use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use rowport_core::FieldKind;
use rowport_core::FieldValue;
use rowport_core::types::{match_enum, parse_bool};

/// Per-mapping coercion applied to a raw cell before typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Collapse internal whitespace and trim.
    Trim,
    Lowercase,
    Uppercase,
    /// Parse a date with an explicit chrono format (e.g. `%d/%m/%Y`).
    Date { format: String },
    /// Lenient number: currency symbols, spaces and thousands separators are dropped.
    Number,
    /// Lenient integer; same cleanup as `number`.
    Integer,
    /// Normalize against an allowed set; defaults to the field's enum values.
    Enum {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
    },
    Boolean,
}

impl TransformKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Trim => "trim",
            TransformKind::Lowercase => "lowercase",
            TransformKind::Uppercase => "uppercase",
            TransformKind::Date { .. } => "date",
            TransformKind::Number => "number",
            TransformKind::Integer => "integer",
            TransformKind::Enum { .. } => "enum",
            TransformKind::Boolean => "boolean",
        }
    }

    /// Whether this transform can produce a value for `kind`.
    pub fn supports(&self, kind: &FieldKind) -> bool {
        match self {
            TransformKind::Trim | TransformKind::Lowercase | TransformKind::Uppercase => true,
            TransformKind::Date { .. } => matches!(kind, FieldKind::Date | FieldKind::DateTime),
            TransformKind::Number | TransformKind::Integer => {
                matches!(kind, FieldKind::Number { .. } | FieldKind::Integer)
            }
            TransformKind::Enum { values } => match kind {
                FieldKind::Enum { .. } => true,
                FieldKind::Text => values.as_ref().is_some_and(|values| !values.is_empty()),
                _ => false,
            },
            TransformKind::Boolean => matches!(kind, FieldKind::Boolean),
        }
    }

    /// Apply the transform to a raw cell for a field of `kind`.
    pub fn apply(&self, raw: &str, kind: &FieldKind) -> Result<FieldValue, String> {
        let value = raw.trim();
        match self {
            TransformKind::Trim => {
                let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
                kind.coerce(&collapsed)
            }
            TransformKind::Lowercase => kind.coerce(&value.to_lowercase()),
            TransformKind::Uppercase => kind.coerce(&value.to_uppercase()),
            _ if value.is_empty() => Ok(FieldValue::Null),
            TransformKind::Date { format } => parse_with_format(value, format, kind),
            TransformKind::Number => {
                let number = lenient_number(value)?;
                match kind {
                    FieldKind::Integer => whole_to_i64(number)
                        .map(FieldValue::Integer)
                        .ok_or_else(|| format!("'{value}' is not a whole number in range")),
                    _ => Ok(FieldValue::Number(number)),
                }
            }
            TransformKind::Integer => {
                let cleaned = normalize_number(value)?;
                let integer = cleaned
                    .parse::<i64>()
                    .map_err(|_| format!("invalid integer '{value}'"))?;
                match kind {
                    FieldKind::Number { .. } => Ok(FieldValue::Number(integer as f64)),
                    _ => Ok(FieldValue::Integer(integer)),
                }
            }
            TransformKind::Enum { values } => {
                let allowed = values
                    .as_deref()
                    .or_else(|| kind.enum_values())
                    .unwrap_or_default();
                match_enum(value, allowed).map(FieldValue::Text)
            }
            TransformKind::Boolean => parse_bool(value).map(FieldValue::Boolean),
        }
    }
}

fn parse_with_format(value: &str, format: &str, kind: &FieldKind) -> Result<FieldValue, String> {
    let invalid = || format!("invalid date '{value}' (expected format {format})");
    match kind {
        FieldKind::DateTime => {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(FieldValue::DateTime(parsed.and_utc()));
            }
            let date = NaiveDate::parse_from_str(value, format).map_err(|_| invalid())?;
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            Ok(FieldValue::DateTime(midnight.and_utc()))
        }
        _ => NaiveDate::parse_from_str(value, format)
            .map(FieldValue::Date)
            .map_err(|_| invalid()),
    }
}

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Reduce a human-formatted number to plain `[-]digits[.digits][e..]` text.
///
/// Accepts one leading or trailing currency symbol, a sign or accounting
/// parentheses, and comma thousands separators in groups of three. Anything
/// else is rejected.
fn normalize_number(value: &str) -> Result<String, String> {
    let invalid = || format!("invalid number '{value}'");
    let mut text = value.trim();
    let mut negative = false;
    let mut signed = false;

    if let Some(inner) = text.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        signed = true;
        text = inner.trim();
    }
    take_sign(&mut text, &mut negative, &mut signed);
    if let Some(rest) = text.strip_prefix(CURRENCY_SYMBOLS) {
        text = rest.trim_start();
    } else if let Some(rest) = text.strip_suffix(CURRENCY_SYMBOLS) {
        text = rest.trim_end();
    }
    take_sign(&mut text, &mut negative, &mut signed);

    let (int_part, rest) = match text.find(['.', 'e', 'E']) {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let digits = if int_part.contains(',') {
        ungroup(int_part).ok_or_else(invalid)?
    } else {
        int_part.to_string()
    };

    let body = format!("{digits}{rest}");
    let plain = body
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'));
    if (digits.is_empty() && !rest.starts_with('.')) || !plain {
        return Err(invalid());
    }
    Ok(if negative { format!("-{body}") } else { body })
}

fn take_sign(text: &mut &str, negative: &mut bool, signed: &mut bool) {
    if *signed {
        return;
    }
    if let Some(rest) = text.strip_prefix('-') {
        *negative = true;
        *signed = true;
        *text = rest.trim_start();
    } else if let Some(rest) = text.strip_prefix('+') {
        *signed = true;
        *text = rest.trim_start();
    }
}

/// `1,234,567` to `1234567`; `None` unless every group after the first has three digits.
fn ungroup(int_part: &str) -> Option<String> {
    let mut groups = int_part.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 || !first.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let mut digits = first.to_string();
    for group in groups {
        if group.len() != 3 || !group.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

fn lenient_number(value: &str) -> Result<f64, String> {
    match normalize_number(value)?.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(format!("invalid number '{value}'")),
    }
}

/// Whole `number` within `i64`; `i64::MAX as f64` rounds up to 2^63.
fn whole_to_i64(number: f64) -> Option<i64> {
    let in_range = number >= i64::MIN as f64 && number < i64::MAX as f64;
    (number.fract() == 0.0 && in_range).then_some(number as i64)
}
