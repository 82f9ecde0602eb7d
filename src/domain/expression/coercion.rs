//! Value coercion to declared field types

use serde_json::{Number, Value};

use super::field::FieldType;
use crate::domain::workflow::WorkflowError;

/// Coerce `value` to `target`
///
/// Object, Array and Map pass through untouched. Integer truncates toward zero
/// and must fit in 32 bits.
pub fn convert_type(value: &Value, target: FieldType) -> Result<Value, WorkflowError> {
    match target {
        FieldType::String => Ok(Value::String(stringify(value))),
        FieldType::Number => {
            let number = to_f64(value).ok_or_else(|| conversion_error(value, target))?;
            Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| conversion_error(value, target))
        }
        FieldType::Integer => {
            let number = to_f64(value).ok_or_else(|| conversion_error(value, target))?;
            let truncated = number.trunc();
            if !truncated.is_finite()
                || truncated < f64::from(i32::MIN)
                || truncated > f64::from(i32::MAX)
            {
                return Err(conversion_error(value, target));
            }
            Ok(Value::from(truncated as i64))
        }
        FieldType::Boolean => to_bool(value)
            .map(Value::Bool)
            .ok_or_else(|| conversion_error(value, target)),
        FieldType::Object | FieldType::Array | FieldType::Map => Ok(value.clone()),
    }
}

/// Render a value as text; strings are unquoted, null is empty
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Truthiness used when a bare value stands in for a condition
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Numeric view of a value (numbers, numeric strings, booleans)
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn conversion_error(value: &Value, target: FieldType) -> WorkflowError {
    WorkflowError::type_conversion(value, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_to_number() {
        assert_eq!(convert_type(&json!("3.14"), FieldType::Number).unwrap(), json!(3.14));
        assert_eq!(convert_type(&json!(7), FieldType::Number).unwrap(), json!(7.0));
        assert_eq!(convert_type(&json!(true), FieldType::Number).unwrap(), json!(1.0));
        assert!(matches!(
            convert_type(&json!("abc"), FieldType::Number),
            Err(WorkflowError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_convert_to_integer_truncates() {
        assert_eq!(convert_type(&json!(3.9), FieldType::Integer).unwrap(), json!(3));
        assert_eq!(convert_type(&json!(-3.9), FieldType::Integer).unwrap(), json!(-3));
        assert_eq!(convert_type(&json!("42"), FieldType::Integer).unwrap(), json!(42));
        assert!(convert_type(&json!(1e12), FieldType::Integer).is_err());
        assert!(convert_type(&json!(null), FieldType::Integer).is_err());
    }

    #[test]
    fn test_convert_to_boolean() {
        assert_eq!(convert_type(&json!("TRUE"), FieldType::Boolean).unwrap(), json!(true));
        assert_eq!(convert_type(&json!("0"), FieldType::Boolean).unwrap(), json!(false));
        assert_eq!(convert_type(&json!(2), FieldType::Boolean).unwrap(), json!(true));
        assert!(convert_type(&json!("maybe"), FieldType::Boolean).is_err());
    }

    #[test]
    fn test_convert_to_string() {
        assert_eq!(convert_type(&json!(17), FieldType::String).unwrap(), json!("17"));
        assert_eq!(convert_type(&json!(null), FieldType::String).unwrap(), json!(""));
        assert_eq!(
            convert_type(&json!({"a": 1}), FieldType::String).unwrap(),
            json!("{\"a\":1}")
        );
    }

    #[test]
    fn test_structural_pass_through() {
        let value = json!({"a": [1, 2]});
        assert_eq!(convert_type(&value, FieldType::Object).unwrap(), value);
        assert_eq!(convert_type(&json!("x"), FieldType::Array).unwrap(), json!("x"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([0])));
    }
}
