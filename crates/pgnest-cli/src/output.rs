//! JSON in and out of the command line

use anyhow::Context;
use pgnest_core::{QueryResult, Value};
use serde::Serialize;

/// Parse `--param` values. Each is JSON; anything that is not valid JSON is
/// taken as a plain string.
pub fn parse_params(raw: &[String]) -> anyhow::Result<Vec<Value>> {
    raw.iter()
        .enumerate()
        .map(|(index, text)| {
            let json = match serde_json::from_str::<serde_json::Value>(text) {
                Ok(json) => json,
                Err(_) => serde_json::Value::String(text.clone()),
            };
            json_to_param(json).with_context(|| format!("parameter ${}", index + 1))
        })
        .collect()
}

fn json_to_param(json: serde_json::Value) -> anyhow::Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float64(f)
            } else {
                anyhow::bail!("number {n} does not fit a 64-bit value")
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => Value::Json(json),
    })
}

/// `{"rows": [...], "rowCount": n}`
pub fn query_body(result: &QueryResult) -> serde_json::Value {
    serde_json::json!({
        "rows": result.rows.iter().map(|row| row.to_json()).collect::<Vec<_>>(),
        "rowCount": result.row_count,
    })
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgnest_core::Row;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_params_are_json_with_string_fallback() {
        let params = parse_params(&[
            "42".to_string(),
            "1.5".to_string(),
            "true".to_string(),
            "null".to_string(),
            "\"quoted\"".to_string(),
            "bare words".to_string(),
            "{\"a\":1}".to_string(),
        ])
        .unwrap();

        assert_eq!(
            params,
            vec![
                Value::Int64(42),
                Value::Float64(1.5),
                Value::Bool(true),
                Value::Null,
                Value::String("quoted".to_string()),
                Value::String("bare words".to_string()),
                Value::Json(json!({"a": 1})),
            ]
        );
    }

    #[test]
    fn test_query_body_shape() {
        let columns: Arc<[String]> = Arc::from(vec!["id".to_string(), "name".to_string()]);
        let mut result = QueryResult::empty();
        result.rows.push(Row::new(
            columns,
            vec![Value::Int32(1), Value::String("ada".to_string())],
        ));
        result.row_count = 1;

        assert_eq!(
            query_body(&result),
            json!({"rows": [{"id": 1, "name": "ada"}], "rowCount": 1})
        );
    }

    #[test]
    fn test_empty_update_body() {
        assert_eq!(
            query_body(&QueryResult::empty()),
            json!({"rows": [], "rowCount": 0})
        );
    }
}
