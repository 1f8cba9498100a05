//! Decoding positional bulk reads into typed snapshots
//!
//! A bulk read answers `get_prop` with one value per requested name, in the
//! schema's order. Values arrive as loosely typed JSON (numbers are often sent
//! as strings) and are coerced by the static kind of each attribute:
//! numeric kinds parse as integers, booleans are `true` only for the exact
//! literal `"on"`, and text passes through.

use attribute_store::{AttributeKind, AttributeSchema, AttributeSnapshot, AttributeValue};
use serde_json::Value;

/// Build a full snapshot from a positional result list
///
/// Positions missing from `values` keep the attribute's empty value; extra
/// trailing values are ignored.
pub fn decode(schema: &AttributeSchema, values: &[Value]) -> AttributeSnapshot {
    let mut builder = AttributeSnapshot::builder(schema);
    for (spec, raw) in schema.iter().zip(values) {
        builder.set(&spec.name, coerce(spec.kind, raw));
    }
    builder.build()
}

/// Coerce one raw value by the attribute's kind
pub fn coerce(kind: AttributeKind, raw: &Value) -> AttributeValue {
    match kind {
        AttributeKind::Number => AttributeValue::Number(number_of(raw).unwrap_or(0)),
        AttributeKind::Boolean => AttributeValue::Bool(raw.as_str() == Some("on")),
        AttributeKind::Text => AttributeValue::Text(match raw {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }),
    }
}

/// Parameters for a `get_prop` query over every tracked attribute
pub fn query_params(schema: &AttributeSchema) -> Vec<Value> {
    schema.names().map(Value::from).collect()
}

fn number_of(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribute_store::AttributeSpec;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(AttributeKind::Number, json!("50"), AttributeValue::Number(50))]
    #[case(AttributeKind::Number, json!(2700), AttributeValue::Number(2700))]
    #[case(AttributeKind::Number, json!(" 12 "), AttributeValue::Number(12))]
    #[case(AttributeKind::Number, json!("3.6"), AttributeValue::Number(4))]
    #[case(AttributeKind::Number, json!(""), AttributeValue::Number(0))]
    #[case(AttributeKind::Number, json!("abc"), AttributeValue::Number(0))]
    #[case(AttributeKind::Boolean, json!("on"), AttributeValue::Bool(true))]
    #[case(AttributeKind::Boolean, json!("off"), AttributeValue::Bool(false))]
    #[case(AttributeKind::Boolean, json!("ON"), AttributeValue::Bool(false))]
    #[case(AttributeKind::Boolean, json!(true), AttributeValue::Bool(false))]
    #[case(AttributeKind::Boolean, json!(1), AttributeValue::Bool(false))]
    #[case(AttributeKind::Text, json!("Desk"), AttributeValue::Text("Desk".to_string()))]
    #[case(AttributeKind::Text, json!(1), AttributeValue::Text("1".to_string()))]
    #[case(AttributeKind::Text, json!(null), AttributeValue::Text(String::new()))]
    fn test_coerce(#[case] kind: AttributeKind, #[case] raw: Value, #[case] expected: AttributeValue) {
        assert_eq!(coerce(kind, &raw), expected);
    }

    fn schema() -> AttributeSchema {
        AttributeSchema::new(vec![
            AttributeSpec::new("bright", AttributeKind::Number),
            AttributeSpec::new("power", AttributeKind::Boolean).power(),
            AttributeSpec::new("sat", AttributeKind::Number),
            AttributeSpec::new("ct", AttributeKind::Number),
            AttributeSpec::new("name", AttributeKind::Text),
        ])
    }

    #[test]
    fn test_decode_is_positional() {
        let snapshot = decode(&schema(), &[json!(1), json!("on"), json!(50), json!(2700), json!("lamp")]);
        assert_eq!(snapshot.number("bright"), Some(1));
        assert_eq!(snapshot.bool("power"), Some(true));
        assert_eq!(snapshot.number("sat"), Some(50));
        assert_eq!(snapshot.number("ct"), Some(2700));
        assert_eq!(snapshot.text("name"), Some("lamp"));
    }

    #[test]
    fn test_decode_short_result_keeps_defaults() {
        let snapshot = decode(&schema(), &[json!("80"), json!("on"), json!("10"), json!("4000")]);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.text("name"), Some(""));
    }

    #[test]
    fn test_query_params_follow_schema_order() {
        assert_eq!(
            query_params(&schema()),
            vec![json!("bright"), json!("power"), json!("sat"), json!("ct"), json!("name")]
        );
    }
}
