use serde_json::Value;

use rowport_core::{FieldValue, ORGANIZATION_COLUMN, Record};

/// Convert a `to_jsonb(row)` object into a [`Record`].
///
/// Values are loosely typed here; callers re-type them against the field
/// kind they expect.
pub fn record_from_json(value: Value) -> Record {
    let Value::Object(map) = value else {
        return Record::new();
    };
    map.into_iter()
        .filter(|(column, _)| column != ORGANIZATION_COLUMN && column != "deleted_at")
        .map(|(column, value)| (column, field_from_json(value)))
        .collect()
}

fn field_from_json(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(value) => FieldValue::Boolean(value),
        Value::Number(number) => match number.as_i64() {
            Some(value) => FieldValue::Integer(value),
            None => number
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Json(Value::Number(number))),
        },
        Value::String(value) => FieldValue::Text(value),
        Value::Array(items) if items.iter().all(Value::is_string) => FieldValue::List(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(item) => Some(item),
                    _ => None,
                })
                .collect(),
        ),
        other => FieldValue::Json(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_json_row_to_record() {
        let record = record_from_json(json!({
            "id": "7f0c",
            "organization_id": "acme",
            "deleted_at": null,
            "name": "Laptop",
            "quantity": 3,
            "cost": 12.5,
            "active": true,
            "tags": ["a", "b"],
            "meta": {"k": 1}
        }));

        assert!(!record.contains_key("organization_id"));
        assert!(!record.contains_key("deleted_at"));
        assert_eq!(record.get("quantity"), Some(&FieldValue::Integer(3)));
        assert_eq!(record.get("cost"), Some(&FieldValue::Number(12.5)));
        assert_eq!(record.get("active"), Some(&FieldValue::Boolean(true)));
        assert_eq!(
            record.get("tags"),
            Some(&FieldValue::List(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(record.get("meta"), Some(&FieldValue::Json(json!({"k": 1}))));
    }
}
