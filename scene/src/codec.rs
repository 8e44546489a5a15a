//! String forms of attribute values
//!
//! Tuples and transforms are space-separated numbers and booleans are the
//! literals `true` and `false`. Backends pick the list separator for arrays.

use crate::attribute_types::{AttributeValue, TransformValue};
use crate::error::CodecError;

/// Format a number the shortest way that parses back to the same value
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_tuple(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_number(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-precision counterpart of [`format_number`]
fn format_field(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_transform(transform: &TransformValue) -> String {
    transform
        .fields()
        .iter()
        .map(|v| format_field(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

pub fn parse_number(text: &str) -> Result<f64, CodecError> {
    let token = text.trim();
    token.parse::<f64>().map_err(|_| CodecError::Number {
        token: token.to_string(),
        input: text.to_string(),
    })
}

pub fn parse_int(text: &str) -> Result<i64, CodecError> {
    let token = text.trim();
    token.parse::<i64>().map_err(|_| CodecError::Number {
        token: token.to_string(),
        input: text.to_string(),
    })
}

pub fn parse_bool(text: &str) -> Result<bool, CodecError> {
    match text.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CodecError::Boolean {
            input: text.to_string(),
        }),
    }
}

/// Parse whitespace-separated numbers
pub fn parse_numbers(text: &str) -> Result<Vec<f64>, CodecError> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| CodecError::Number {
                token: token.to_string(),
                input: text.to_string(),
            })
        })
        .collect()
}

/// Parse exactly `arity` whitespace-separated numbers
pub fn parse_tuple(text: &str, arity: usize) -> Result<Vec<f64>, CodecError> {
    let values = parse_numbers(text)?;
    if values.len() != arity {
        return Err(CodecError::Arity {
            expected: arity,
            found: values.len(),
            input: text.to_string(),
        });
    }
    Ok(values)
}

pub fn parse_transform(text: &str) -> Result<TransformValue, CodecError> {
    let values = parse_tuple(text, TransformValue::FIELD_COUNT)?;
    let mut fields = [0.0f32; 9];
    for (slot, value) in fields.iter_mut().zip(values) {
        *slot = value as f32;
    }
    Ok(TransformValue::from_fields(fields))
}

/// Split a list on `separator`, dropping empty items
///
/// Backends normalize stored lists the same way (see [`normalize_list`]), so
/// a list survives its string form.
pub fn parse_list(text: &str, separator: char) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trim list items and drop the empty ones
pub fn normalize_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| {
            let trimmed = item.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

/// Generic string form of a value
pub fn format_value(value: &AttributeValue, list_separator: &str) -> String {
    match value {
        AttributeValue::Bool(v) => format_bool(*v).to_string(),
        AttributeValue::Int(v) => v.to_string(),
        AttributeValue::Real(v) => format_number(*v),
        AttributeValue::String(v) => v.clone(),
        AttributeValue::Tuple(v) => format_tuple(v),
        AttributeValue::Transform(t) => format_transform(t),
        AttributeValue::Array(v) => v.join(list_separator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.25), "-0.25");
        assert_eq!(format_tuple(&[1.0, 0.5, 3.0]), "1 0.5 3");
    }

    #[test]
    fn test_tuple_parsing() {
        assert_eq!(parse_tuple(" 1  2.5 -3 ", 3), Ok(vec![1.0, 2.5, -3.0]));
        assert!(matches!(
            parse_tuple("1 2", 3),
            Err(CodecError::Arity {
                expected: 3,
                found: 2,
                ..
            })
        ));
        assert!(matches!(
            parse_tuple("1 x 3", 3),
            Err(CodecError::Number { .. })
        ));
    }

    #[test]
    fn test_bool_literals() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool(" false "), Ok(false));
        assert!(parse_bool("1").is_err());
        assert_eq!(format_bool(true), "true");
    }

    #[test]
    fn test_transform_text() {
        let t = TransformValue {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let text = format_transform(&t);
        assert_eq!(text, "1 2 3 0 90 0 2 2 2");
        assert_eq!(parse_transform(&text), Ok(t));

        // Negative scale is clamped on the way in
        let clamped = parse_transform("0 0 0 0 0 0 -1 1 1").unwrap();
        assert_eq!(clamped.scale.x, 0.0);
    }

    #[test]
    fn test_transform_text_large_values() {
        let t = TransformValue {
            position: Vec3::new(1e20, -3e18, 0.5),
            rotation: Vec3::new(f32::MAX, 0.0, 0.0),
            scale: Vec3::new(1e16, 1.0, 1.0),
        };
        let text = format_transform(&t);
        assert!(!text.contains(&i64::MAX.to_string()), "{text}");
        assert_eq!(parse_transform(&text), Ok(t));
    }

    #[test]
    fn test_lists() {
        assert_eq!(parse_list("a.mesh; b.mesh;;", ';'), vec!["a.mesh", "b.mesh"]);
        assert_eq!(
            normalize_list(vec![" a.mesh".into(), String::new(), "b.mesh".into()]),
            vec!["a.mesh", "b.mesh"]
        );
        assert_eq!(
            format_value(
                &AttributeValue::Array(vec!["a".into(), "b".into()]),
                ";"
            ),
            "a;b"
        );
    }
}
