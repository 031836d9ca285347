//! Lenient coercion of loosely typed report fields.
//!
//! Upstream rows mix numbers, numeric strings and nulls in the same column. Every
//! numeric read goes through [`normalize_value`], which degrades anything it cannot
//! parse to `0.0` instead of failing.

use serde_json::Value;

use crate::schema::{ReportRow, FALLBACK_GROUP_LABEL};

pub fn normalize_value(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Missing fields count as zero.
pub fn normalize(value: Option<&Value>) -> f64 {
    value.map(normalize_value).unwrap_or(0.0)
}

pub fn field_value(row: &ReportRow, field: &str) -> f64 {
    normalize(row.get(field))
}

/// Text of a hierarchy field, with [`FALLBACK_GROUP_LABEL`] for missing or blank values.
pub fn hierarchy_label(row: &ReportRow, field: &str) -> String {
    let text = match row.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };

    if text.is_empty() {
        FALLBACK_GROUP_LABEL.to_string()
    } else {
        text
    }
}

/// Rewrites the given fields of `row` as JSON numbers.
pub fn normalize_row(row: &ReportRow, numeric_fields: &[String]) -> ReportRow {
    let mut cleaned = row.clone();
    for field in numeric_fields {
        let number = field_value(row, field);
        let value = serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0));
        cleaned.insert(field.clone(), value);
    }
    cleaned
}

pub fn normalize_rows(rows: &[ReportRow], numeric_fields: &[String]) -> Vec<ReportRow> {
    rows.iter()
        .map(|row| normalize_row(row, numeric_fields))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> ReportRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(normalize_value(&json!(12.5)), 12.5);
        assert_eq!(normalize_value(&json!("12.5")), 12.5);
        assert_eq!(normalize_value(&json!("  -3 ")), -3.0);
        assert_eq!(normalize_value(&json!("1e3")), 1000.0);
        assert_eq!(normalize_value(&json!(null)), 0.0);
        assert_eq!(normalize_value(&json!("n/a")), 0.0);
        assert_eq!(normalize_value(&json!("")), 0.0);
        assert_eq!(normalize_value(&json!(true)), 0.0);
        assert_eq!(normalize_value(&json!([1, 2])), 0.0);
        assert_eq!(normalize(None), 0.0);
    }

    #[test]
    fn test_non_finite_strings_degrade_to_zero() {
        assert_eq!(normalize_value(&json!("NaN")), 0.0);
        assert_eq!(normalize_value(&json!("inf")), 0.0);
        assert_eq!(normalize_value(&json!("-infinity")), 0.0);
    }

    #[test]
    fn test_hierarchy_label_fallback() {
        let r = row(json!({ "region": "  North ", "location": "", "code": 42, "empty": null }));
        assert_eq!(hierarchy_label(&r, "region"), "North");
        assert_eq!(hierarchy_label(&r, "location"), FALLBACK_GROUP_LABEL);
        assert_eq!(hierarchy_label(&r, "code"), "42");
        assert_eq!(hierarchy_label(&r, "empty"), FALLBACK_GROUP_LABEL);
        assert_eq!(hierarchy_label(&r, "missing"), FALLBACK_GROUP_LABEL);
    }

    #[test]
    fn test_normalize_row_rewrites_only_numeric_fields() {
        let r = row(json!({ "region": "North", "qty": "10", "gross_value": null }));
        let fields = vec!["qty".to_string(), "gross_value".to_string(), "absent".to_string()];
        let cleaned = normalize_row(&r, &fields);

        assert_eq!(cleaned["region"], json!("North"));
        assert_eq!(cleaned["qty"], json!(10.0));
        assert_eq!(cleaned["gross_value"], json!(0.0));
        assert_eq!(cleaned["absent"], json!(0.0));
    }
}
