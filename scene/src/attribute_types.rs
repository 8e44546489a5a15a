//! Attribute values and the type classification protocol
//!
//! A backend tags every attribute with a backend-defined type id. Generic
//! code never interprets those ids directly; it asks the backend's
//! [`AttributeTypeSystem`] which editing strategy applies and dispatches on
//! the resulting [`AttributeClass`].

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Position, rotation (euler degrees) and scale of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformValue {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for TransformValue {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl TransformValue {
    /// Number of editable scalar fields
    pub const FIELD_COUNT: usize = 9;

    /// Create a transform at `position` with no rotation and unit scale
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set the scale of the transform
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Flatten to position, rotation, scale
    pub fn fields(&self) -> [f32; 9] {
        let (p, r, s) = (self.position, self.rotation, self.scale);
        [p.x, p.y, p.z, r.x, r.y, r.z, s.x, s.y, s.z]
    }

    /// Build from the flattened field layout; scale is clamped to be non-negative
    pub fn from_fields(fields: [f32; 9]) -> Self {
        let [px, py, pz, rx, ry, rz, sx, sy, sz] = fields;
        Self {
            position: Vec3::new(px, py, pz),
            rotation: Vec3::new(rx, ry, rz),
            scale: Vec3::new(sx, sy, sz).max(Vec3::ZERO),
        }
    }

    /// Copy with one flattened field replaced
    ///
    /// Indices 6..9 are scale components and never go below zero.
    pub fn with_field(&self, index: usize, value: f32) -> Self {
        let mut fields = self.fields();
        if let Some(slot) = fields.get_mut(index) {
            *slot = value;
        }
        Self::from_fields(fields)
    }

    /// Rotation as a quaternion (XYZ euler order)
    pub fn rotation_quat(&self) -> glam::Quat {
        glam::Quat::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        )
    }

    /// Local transformation matrix
    pub fn to_matrix(&self) -> glam::Mat4 {
        glam::Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.position)
    }
}

/// A value held by an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
    /// Fixed-arity numeric tuple
    Tuple(Vec<f64>),
    Transform(TransformValue),
    /// Variable-length homogeneous sequence of string-serializable items
    Array(Vec<String>),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, accepting both integer and real storage
    pub fn as_real(&self) -> Option<f64> {
        match self {
            AttributeValue::Real(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[f64]> {
        match self {
            AttributeValue::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<TransformValue> {
        match self {
            AttributeValue::Transform(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[String]> {
        match self {
            AttributeValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Tuple components narrowed to a `Vec3` (missing components are zero)
    pub fn as_vec3(&self) -> Option<Vec3> {
        let t = self.as_tuple()?;
        let at = |i: usize| t.get(i).copied().unwrap_or(0.0) as f32;
        Some(Vec3::new(at(0), at(1), at(2)))
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Real(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "{v}"),
            AttributeValue::Tuple(v) => {
                let parts: Vec<String> = v.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
            AttributeValue::Transform(t) => {
                let parts: Vec<String> = t.fields().iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
            AttributeValue::Array(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// One choice of an enumeration attribute
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub label: String,
    pub value: AttributeValue,
}

impl EnumValue {
    pub fn new(label: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Classification predicates a backend implements for its type ids
///
/// For every type id a backend can produce, exactly one of atomic, enum,
/// tuple (arity > 0), transform or array must hold.
pub trait AttributeTypeSystem {
    /// Single scalar editable with one input control
    fn is_attribute_atomic(&self, type_id: u32) -> bool;

    /// Value constrained to a finite labeled set
    fn is_attribute_enum(&self, type_id: u32) -> bool;

    /// Tuple arity, or 0 if the type is not a tuple
    fn is_attribute_tuple(&self, type_id: u32) -> usize;

    /// Refines tuple labeling to r/g/b/a
    fn is_attribute_color(&self, type_id: u32) -> bool;

    /// Position, rotation and scale composite
    fn is_attribute_transform(&self, type_id: u32) -> bool;

    /// Variable-length homogeneous sequence
    fn is_attribute_array(&self, type_id: u32) -> bool;

    /// Human-readable name of a type id, used in diagnostics
    fn attribute_type_name(&self, type_id: u32) -> String {
        format!("type {type_id}")
    }
}

static COLOR_LABELS: [&str; 4] = ["r", "g", "b", "a"];
static VECTOR_LABELS: [&str; 4] = ["x", "y", "z", "w"];
static TRANSFORM_LABELS: [&str; 9] = [
    "pos x", "pos y", "pos z", "rot x", "rot y", "rot z", "scale x", "scale y", "scale z",
];

/// Editing strategy selected for an attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeClass {
    Atomic,
    Enum,
    Tuple { arity: usize, color: bool },
    Transform,
    Array,
}

impl AttributeClass {
    /// Sub-field labels for tuple and transform editors
    ///
    /// Tuples wider than four components have no named labels.
    pub fn field_labels(&self) -> &'static [&'static str] {
        match self {
            AttributeClass::Tuple { arity, color: true } if *arity <= 4 => &COLOR_LABELS[..*arity],
            AttributeClass::Tuple { arity, .. } if *arity <= 4 => &VECTOR_LABELS[..*arity],
            AttributeClass::Transform => &TRANSFORM_LABELS,
            _ => &[],
        }
    }
}

/// A type id that matched none, or more than one, of the classification predicates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute {type_name} not implemented ({matches} classification predicates matched)")]
pub struct UnsupportedType {
    pub type_id: u32,
    pub type_name: String,
    pub matches: usize,
}

/// Determine the editing strategy for `type_id`
pub fn classify<T>(types: &T, type_id: u32) -> Result<AttributeClass, UnsupportedType>
where
    T: AttributeTypeSystem + ?Sized,
{
    let arity = types.is_attribute_tuple(type_id);
    let mut candidates = Vec::with_capacity(1);

    if types.is_attribute_atomic(type_id) {
        candidates.push(AttributeClass::Atomic);
    }
    if types.is_attribute_enum(type_id) {
        candidates.push(AttributeClass::Enum);
    }
    if arity > 0 {
        candidates.push(AttributeClass::Tuple {
            arity,
            color: types.is_attribute_color(type_id),
        });
    }
    if types.is_attribute_transform(type_id) {
        candidates.push(AttributeClass::Transform);
    }
    if types.is_attribute_array(type_id) {
        candidates.push(AttributeClass::Array);
    }

    match candidates.as_slice() {
        [class] => Ok(*class),
        _ => Err(UnsupportedType {
            type_id,
            type_name: types.attribute_type_name(type_id),
            matches: candidates.len(),
        }),
    }
}
