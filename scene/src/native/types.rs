//! Attribute type ids of the native backend

use crate::attribute_types::{AttributeValue, TransformValue};
use crate::codec;
use crate::error::CodecError;

/// Separator used in the string form of asset reference lists
pub const LIST_SEPARATOR: char = ';';

/// Attribute types the native schema can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NativeType {
    String = 1,
    Int = 2,
    Real = 3,
    Color = 4,
    Float2 = 5,
    Float3 = 6,
    Float4 = 7,
    Bool = 8,
    UInt = 9,
    Quat = 10,
    AssetReference = 11,
    AssetReferenceList = 12,
    EntityReference = 13,
    Transform = 16,
    Enum = 20,
}

impl NativeType {
    pub const ALL: [NativeType; 15] = [
        NativeType::String,
        NativeType::Int,
        NativeType::Real,
        NativeType::Color,
        NativeType::Float2,
        NativeType::Float3,
        NativeType::Float4,
        NativeType::Bool,
        NativeType::UInt,
        NativeType::Quat,
        NativeType::AssetReference,
        NativeType::AssetReferenceList,
        NativeType::EntityReference,
        NativeType::Transform,
        NativeType::Enum,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(type_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == type_id)
    }

    /// Look up a type by its name, as used when declaring dynamic attributes
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            NativeType::String => "string",
            NativeType::Int => "int",
            NativeType::Real => "real",
            NativeType::Color => "Color",
            NativeType::Float2 => "float2",
            NativeType::Float3 => "float3",
            NativeType::Float4 => "float4",
            NativeType::Bool => "bool",
            NativeType::UInt => "uint",
            NativeType::Quat => "Quat",
            NativeType::AssetReference => "AssetReference",
            NativeType::AssetReferenceList => "AssetReferenceList",
            NativeType::EntityReference => "EntityReference",
            NativeType::Transform => "Transform",
            NativeType::Enum => "enum",
        }
    }

    /// Tuple arity, 0 for non-tuples
    pub fn arity(self) -> usize {
        match self {
            NativeType::Float2 => 2,
            NativeType::Float3 => 3,
            NativeType::Color | NativeType::Float4 | NativeType::Quat => 4,
            _ => 0,
        }
    }

    /// Value a freshly created attribute of this type holds
    pub fn default_value(self) -> AttributeValue {
        match self {
            NativeType::String | NativeType::AssetReference | NativeType::EntityReference => {
                AttributeValue::String(String::new())
            }
            NativeType::Int | NativeType::UInt | NativeType::Enum => AttributeValue::Int(0),
            NativeType::Real => AttributeValue::Real(0.0),
            NativeType::Bool => AttributeValue::Bool(false),
            NativeType::Color => AttributeValue::Tuple(vec![0.0, 0.0, 0.0, 1.0]),
            NativeType::Quat => AttributeValue::Tuple(vec![0.0, 0.0, 0.0, 1.0]),
            NativeType::Float2 | NativeType::Float3 | NativeType::Float4 => {
                AttributeValue::Tuple(vec![0.0; self.arity()])
            }
            NativeType::AssetReferenceList => AttributeValue::Array(Vec::new()),
            NativeType::Transform => AttributeValue::Transform(Default::default()),
        }
    }

    /// Whether `value` has the shape this type stores
    pub fn accepts(self, value: &AttributeValue) -> bool {
        match (self, value) {
            (
                NativeType::String | NativeType::AssetReference | NativeType::EntityReference,
                AttributeValue::String(_),
            ) => true,
            (NativeType::Int | NativeType::Enum, AttributeValue::Int(_)) => true,
            (NativeType::UInt, AttributeValue::Int(v)) => *v >= 0,
            (NativeType::Real, AttributeValue::Real(_) | AttributeValue::Int(_)) => true,
            (NativeType::Bool, AttributeValue::Bool(_)) => true,
            (_, AttributeValue::Tuple(t)) => self.arity() > 0 && t.len() == self.arity(),
            (NativeType::AssetReferenceList, AttributeValue::Array(items)) => {
                items.iter().all(|item| !item.contains(LIST_SEPARATOR))
            }
            (NativeType::Transform, AttributeValue::Transform(_)) => true,
            _ => false,
        }
    }

    /// Normalize an accepted value to the stored representation
    pub fn normalize(self, value: AttributeValue) -> AttributeValue {
        match (self, value) {
            (NativeType::Real, AttributeValue::Int(v)) => AttributeValue::Real(v as f64),
            (NativeType::Transform, AttributeValue::Transform(t)) => {
                AttributeValue::Transform(TransformValue::from_fields(t.fields()))
            }
            (NativeType::AssetReferenceList, AttributeValue::Array(items)) => {
                AttributeValue::Array(codec::normalize_list(items))
            }
            (_, value) => value,
        }
    }

    /// Parse the string form of a value of this type
    pub fn parse(self, text: &str) -> Result<AttributeValue, CodecError> {
        Ok(match self {
            NativeType::String | NativeType::AssetReference | NativeType::EntityReference => {
                AttributeValue::String(text.to_string())
            }
            NativeType::Int | NativeType::Enum => AttributeValue::Int(codec::parse_int(text)?),
            NativeType::UInt => {
                let value = codec::parse_int(text)?;
                if value < 0 {
                    return Err(CodecError::Number {
                        token: text.trim().to_string(),
                        input: text.to_string(),
                    });
                }
                AttributeValue::Int(value)
            }
            NativeType::Real => AttributeValue::Real(codec::parse_number(text)?),
            NativeType::Bool => AttributeValue::Bool(codec::parse_bool(text)?),
            NativeType::Color
            | NativeType::Float2
            | NativeType::Float3
            | NativeType::Float4
            | NativeType::Quat => AttributeValue::Tuple(codec::parse_tuple(text, self.arity())?),
            NativeType::AssetReferenceList => {
                AttributeValue::Array(codec::parse_list(text, LIST_SEPARATOR))
            }
            NativeType::Transform => AttributeValue::Transform(codec::parse_transform(text)?),
        })
    }

    pub fn format(self, value: &AttributeValue) -> String {
        codec::format_value(value, &LIST_SEPARATOR.to_string())
    }
}

/// Classification predicates over [`NativeType`] ids
pub(crate) fn is_atomic(type_id: u32) -> bool {
    matches!(
        NativeType::from_id(type_id),
        Some(
            NativeType::String
                | NativeType::Int
                | NativeType::Real
                | NativeType::Bool
                | NativeType::UInt
                | NativeType::AssetReference
                | NativeType::EntityReference
        )
    )
}

pub(crate) fn is_enum(type_id: u32) -> bool {
    NativeType::from_id(type_id) == Some(NativeType::Enum)
}

pub(crate) fn tuple_arity(type_id: u32) -> usize {
    NativeType::from_id(type_id).map_or(0, NativeType::arity)
}

pub(crate) fn is_color(type_id: u32) -> bool {
    NativeType::from_id(type_id) == Some(NativeType::Color)
}

pub(crate) fn is_transform(type_id: u32) -> bool {
    NativeType::from_id(type_id) == Some(NativeType::Transform)
}

pub(crate) fn is_array(type_id: u32) -> bool {
    NativeType::from_id(type_id) == Some(NativeType::AssetReferenceList)
}
