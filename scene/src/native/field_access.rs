//! Field access for typed native components
//!
//! Typed components expose their fields as named attributes. The component
//! registry uses this trait to read and write fields without knowing the
//! concrete component type.

use super::types::NativeType;
use crate::attribute_types::{AttributeValue, EnumValue};

/// Static description of one component field
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub native_type: NativeType,
    /// Labeled choices for enumeration fields, empty otherwise
    pub valid_values: &'static [(&'static str, i64)],
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, native_type: NativeType) -> Self {
        Self {
            name,
            native_type,
            valid_values: &[],
        }
    }

    pub const fn enumeration(name: &'static str, valid_values: &'static [(&'static str, i64)]) -> Self {
        Self {
            name,
            native_type: NativeType::Enum,
            valid_values,
        }
    }

    /// Valid values as labeled attribute values, `None` when unconstrained
    pub fn enum_values(&self) -> Option<Vec<EnumValue>> {
        if self.valid_values.is_empty() {
            return None;
        }
        Some(
            self.valid_values
                .iter()
                .map(|(label, value)| EnumValue::new(*label, AttributeValue::Int(*value)))
                .collect(),
        )
    }

    /// Whether `value` may be stored in this field
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        if !self.native_type.accepts(value) {
            return false;
        }
        match (self.valid_values.is_empty(), value) {
            (true, _) => true,
            (false, AttributeValue::Int(v)) => self.valid_values.iter().any(|(_, c)| c == v),
            (false, _) => false,
        }
    }
}

/// Trait for components that support field access by attribute name
pub trait FieldAccess {
    /// Field layout, in attribute index order
    fn fields() -> &'static [FieldDescriptor]
    where
        Self: Sized;

    /// Get a field value by name
    fn get_field(&self, field_name: &str) -> Option<AttributeValue>;

    /// Set a field value by name
    /// Returns true if the field was successfully set
    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool;
}

/// Look up the descriptor for `field_name` in `fields`
pub fn descriptor<'a>(fields: &'a [FieldDescriptor], field_name: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.name == field_name)
}

/// Copy a numeric tuple into a fixed array
pub(crate) fn tuple_into<const N: usize>(value: &AttributeValue) -> Option<[f64; N]> {
    let tuple = value.as_tuple()?;
    tuple.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHOICES: &[(&str, i64)] = &[("Low", 0), ("High", 1)];

    #[test]
    fn test_enum_descriptor() {
        let field = FieldDescriptor::enumeration("quality", CHOICES);
        assert!(field.accepts(&AttributeValue::Int(1)));
        assert!(!field.accepts(&AttributeValue::Int(2)));

        let values = field.enum_values().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1].label, "High");
    }

    #[test]
    fn test_plain_descriptor_unconstrained() {
        let field = FieldDescriptor::new("brightness", NativeType::Real);
        assert!(field.enum_values().is_none());
        assert!(field.accepts(&AttributeValue::Real(2.5)));
        assert!(!field.accepts(&AttributeValue::Bool(true)));
    }

    #[test]
    fn test_tuple_into() {
        let value = AttributeValue::Tuple(vec![1.0, 2.0, 3.0]);
        assert_eq!(tuple_into::<3>(&value), Some([1.0, 2.0, 3.0]));
        assert_eq!(tuple_into::<4>(&value), None);
    }
}
