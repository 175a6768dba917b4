use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn row(pairs: &[(&str, Value)]) -> Row {
    let columns: Arc<[String]> = pairs.iter().map(|(name, _)| name.to_string()).collect();
    let values = pairs.iter().map(|(_, value)| value.clone()).collect();
    Row::new(columns, values)
}

#[test]
fn test_row_lookup_by_name_and_index() {
    let row = row(&[("id", Value::Int32(7)), ("name", Value::from("ada"))]);

    assert_eq!(row.get(0), Some(&Value::Int32(7)));
    assert_eq!(row.get_by_name("name"), Some(&Value::from("ada")));
    assert_eq!(row.get_by_name("missing"), None);
    assert_eq!(row.len(), 2);
}

#[test]
fn test_get_as_decodes_typed_values() {
    let row = row(&[
        ("id", Value::Int64(42)),
        ("active", Value::Bool(true)),
        ("note", Value::Null),
    ]);

    assert_eq!(row.get_as::<i64>("id").unwrap(), 42);
    assert_eq!(row.get_as::<i32>("id").unwrap(), 42);
    assert!(row.get_as::<bool>("active").unwrap());
    assert_eq!(row.get_as::<Option<String>>("note").unwrap(), None);
}

#[test]
fn test_get_as_parses_text_values() {
    let row = row(&[
        ("count", Value::from("12")),
        ("flag", Value::from("t")),
    ]);

    assert_eq!(row.get_as::<i64>("count").unwrap(), 12);
    assert!(row.get_as::<bool>("flag").unwrap());
}

#[test]
fn test_get_as_reports_decode_errors() {
    let row = row(&[("name", Value::from("ada"))]);

    let missing = row.get_as::<String>("nope").unwrap_err();
    assert!(matches!(missing, PgnestError::Decode(ref msg) if msg.contains("nope")));

    let wrong_type = row.get_as::<i64>("name").unwrap_err();
    assert!(matches!(wrong_type, PgnestError::Decode(_)));
}

#[test]
fn test_row_json_preserves_column_order() {
    let row = row(&[
        ("zeta", Value::Int32(1)),
        ("alpha", Value::Decimal("1.50".into())),
        ("blob", Value::Bytes(vec![0xde, 0xad])),
    ]);

    let rendered = serde_json::to_string(&row).unwrap();
    assert_eq!(rendered, r#"{"zeta":1,"alpha":"1.50","blob":"\\xdead"}"#);
    assert_eq!(row.to_json(), json!({"zeta": 1, "alpha": "1.50", "blob": "\\xdead"}));
}

#[test]
fn test_query_result_serializes_row_count_in_camel_case() {
    let result = QueryResult::empty();
    let rendered = serde_json::to_value(&result).unwrap();

    assert_eq!(
        rendered,
        json!({"rows": [], "rowCount": 0, "executionTimeMs": 0})
    );
}

#[test]
fn test_scalar_reads_first_cell() {
    let mut result = QueryResult::empty();
    assert_eq!(result.scalar(), None);

    result.rows.push(row(&[("current_database", Value::from("neondb"))]));
    assert_eq!(result.scalar().and_then(Value::as_str), Some("neondb"));
}

#[test]
fn test_value_from_option() {
    assert_eq!(Value::from(None::<i32>), Value::Null);
    assert_eq!(Value::from(Some(5i64)), Value::Int64(5));
}

#[test]
fn test_non_finite_floats_render_as_null() {
    assert_eq!(Value::Float64(f64::NAN).to_json(), serde_json::Value::Null);
}
