//! Tag schema and string codec of the markup backend
//!
//! A scene is a `scene` root holding `group` elements. Each group is an
//! entity; its own attributes form the fixed component, and its component
//! children (`mesh`, `light`, `view`, `material`, `data`) are the other
//! components. A `data` element holds one value element per attribute,
//! named by its `name` attribute, with the value as text content.

use crate::attribute_types::{AttributeValue, EnumValue, TransformValue};
use crate::codec;
use crate::error::CodecError;

pub const ROOT_TAG: &str = "scene";
pub const ENTITY_TAG: &str = "group";
pub const DATA_TAG: &str = "data";

/// Element attribute naming a component or a data value
pub const NAME_ATTRIBUTE: &str = "name";
/// Element attribute marking entities and components as local
pub const LOCAL_ATTRIBUTE: &str = "local";
/// Element attribute marking entities and components as temporary
pub const TEMPORARY_ATTRIBUTE: &str = "temporary";

/// Attribute types of the markup schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MarkupType {
    Text = 1,
    Number = 2,
    Boolean = 3,
    Float2 = 4,
    Float3 = 5,
    Float4 = 6,
    Color = 7,
    Transform = 8,
    Enumeration = 9,
    NumberList = 10,
    TextList = 11,
}

impl MarkupType {
    pub const ALL: [MarkupType; 11] = [
        MarkupType::Text,
        MarkupType::Number,
        MarkupType::Boolean,
        MarkupType::Float2,
        MarkupType::Float3,
        MarkupType::Float4,
        MarkupType::Color,
        MarkupType::Transform,
        MarkupType::Enumeration,
        MarkupType::NumberList,
        MarkupType::TextList,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(type_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == type_id)
    }

    /// Tuple arity, 0 for non-tuples
    pub fn arity(self) -> usize {
        match self {
            MarkupType::Float2 => 2,
            MarkupType::Float3 | MarkupType::Color => 3,
            MarkupType::Float4 => 4,
            _ => 0,
        }
    }

    /// Tag of the value element holding this type inside a `data` component
    pub fn value_tag(self) -> Option<&'static str> {
        Some(match self {
            MarkupType::Text => "string",
            MarkupType::Number => "float",
            MarkupType::Boolean => "bool",
            MarkupType::Float2 => "float2",
            MarkupType::Float3 => "float3",
            MarkupType::Float4 => "float4",
            MarkupType::Color => "color",
            MarkupType::Transform => "transform",
            MarkupType::NumberList => "floats",
            MarkupType::TextList => "strings",
            MarkupType::Enumeration => return None,
        })
    }

    pub fn from_value_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.value_tag() == Some(tag))
    }

    /// Text of a freshly created value
    pub fn default_text(self) -> &'static str {
        match self {
            MarkupType::Text | MarkupType::Enumeration => "",
            MarkupType::Number => "0",
            MarkupType::Boolean => "false",
            MarkupType::Float2 => "0 0",
            MarkupType::Float3 => "0 0 0",
            MarkupType::Float4 => "0 0 0 0",
            MarkupType::Color => "1 1 1",
            MarkupType::Transform => "0 0 0 0 0 0 1 1 1",
            MarkupType::NumberList | MarkupType::TextList => "",
        }
    }

    /// Whether `value` has the shape this type stores
    pub fn accepts(self, value: &AttributeValue, choices: &[&str]) -> bool {
        match (self, value) {
            (MarkupType::Text, AttributeValue::String(_)) => true,
            (MarkupType::Enumeration, AttributeValue::String(v)) => {
                choices.is_empty() || choices.contains(&v.as_str())
            }
            (MarkupType::Number, AttributeValue::Real(_) | AttributeValue::Int(_)) => true,
            (MarkupType::Boolean, AttributeValue::Bool(_)) => true,
            (MarkupType::Transform, AttributeValue::Transform(_)) => true,
            (MarkupType::NumberList, AttributeValue::Array(items)) => {
                items.iter().all(|item| codec::parse_number(item).is_ok())
            }
            (MarkupType::TextList, AttributeValue::Array(items)) => {
                items.iter().all(|item| !item.contains('\n'))
            }
            (_, AttributeValue::Tuple(t)) => self.arity() > 0 && t.len() == self.arity(),
            _ => false,
        }
    }

    /// Parse the text form of a value of this type
    pub fn parse(self, text: &str, choices: &[&str]) -> Result<AttributeValue, CodecError> {
        Ok(match self {
            MarkupType::Text => AttributeValue::String(text.to_string()),
            MarkupType::Enumeration => {
                let value = text.trim();
                if !choices.is_empty() && !choices.contains(&value) {
                    return Err(CodecError::EnumValue {
                        input: text.to_string(),
                    });
                }
                AttributeValue::String(value.to_string())
            }
            MarkupType::Number => AttributeValue::Real(codec::parse_number(text)?),
            MarkupType::Boolean => AttributeValue::Bool(codec::parse_bool(text)?),
            MarkupType::Float2 | MarkupType::Float3 | MarkupType::Float4 | MarkupType::Color => {
                AttributeValue::Tuple(codec::parse_tuple(text, self.arity())?)
            }
            MarkupType::Transform => AttributeValue::Transform(codec::parse_transform(text)?),
            MarkupType::NumberList => AttributeValue::Array(
                codec::parse_numbers(text)?
                    .into_iter()
                    .map(codec::format_number)
                    .collect(),
            ),
            MarkupType::TextList => AttributeValue::Array(codec::parse_list(text, '\n')),
        })
    }

    /// Text form of a value of this type
    pub fn format(self, value: &AttributeValue) -> String {
        match self {
            MarkupType::TextList => codec::format_value(value, "\n"),
            _ => codec::format_value(value, " "),
        }
    }

    /// Normalize an accepted value to the stored representation
    pub fn normalize(self, value: AttributeValue) -> AttributeValue {
        match (self, value) {
            (MarkupType::Number, AttributeValue::Int(v)) => AttributeValue::Real(v as f64),
            (MarkupType::Transform, AttributeValue::Transform(t)) => {
                AttributeValue::Transform(TransformValue::from_fields(t.fields()))
            }
            (MarkupType::NumberList, AttributeValue::Array(items)) => AttributeValue::Array(
                items
                    .iter()
                    .filter_map(|item| codec::parse_number(item).ok())
                    .map(codec::format_number)
                    .collect(),
            ),
            (MarkupType::TextList, AttributeValue::Array(items)) => {
                AttributeValue::Array(codec::normalize_list(items))
            }
            (_, value) => value,
        }
    }
}

/// Classification predicates over [`MarkupType`] ids
pub(crate) fn is_atomic(type_id: u32) -> bool {
    matches!(
        MarkupType::from_id(type_id),
        Some(MarkupType::Text | MarkupType::Number | MarkupType::Boolean)
    )
}

pub(crate) fn is_enum(type_id: u32) -> bool {
    MarkupType::from_id(type_id) == Some(MarkupType::Enumeration)
}

pub(crate) fn tuple_arity(type_id: u32) -> usize {
    MarkupType::from_id(type_id).map_or(0, MarkupType::arity)
}

pub(crate) fn is_color(type_id: u32) -> bool {
    MarkupType::from_id(type_id) == Some(MarkupType::Color)
}

pub(crate) fn is_transform(type_id: u32) -> bool {
    MarkupType::from_id(type_id) == Some(MarkupType::Transform)
}

pub(crate) fn is_array(type_id: u32) -> bool {
    matches!(
        MarkupType::from_id(type_id),
        Some(MarkupType::NumberList | MarkupType::TextList)
    )
}

/// An attribute stored as an element attribute
#[derive(Debug)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub markup_type: MarkupType,
    /// Text used when the element attribute is absent
    pub default: &'static str,
    pub choices: &'static [&'static str],
}

impl AttributeSpec {
    const fn new(name: &'static str, markup_type: MarkupType, default: &'static str) -> Self {
        Self {
            name,
            markup_type,
            default,
            choices: &[],
        }
    }

    const fn choice(
        name: &'static str,
        default: &'static str,
        choices: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            markup_type: MarkupType::Enumeration,
            default,
            choices,
        }
    }

    pub fn valid_values(&self) -> Option<Vec<EnumValue>> {
        if self.choices.is_empty() {
            return None;
        }
        Some(
            self.choices
                .iter()
                .map(|choice| EnumValue::new(*choice, AttributeValue::String(choice.to_string())))
                .collect(),
        )
    }
}

/// A component type with a closed attribute set
#[derive(Debug)]
pub struct ComponentSpec {
    pub tag: &'static str,
    pub type_id: u32,
    pub attributes: &'static [AttributeSpec],
}

impl ComponentSpec {
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Intrinsic attributes of every `group`
pub static FIXED_COMPONENT: ComponentSpec = ComponentSpec {
    tag: ENTITY_TAG,
    type_id: 0,
    attributes: &[
        AttributeSpec::new("name", MarkupType::Text, ""),
        AttributeSpec::new("visible", MarkupType::Boolean, "true"),
        AttributeSpec::new("transform", MarkupType::Transform, "0 0 0 0 0 0 1 1 1"),
    ],
};

pub static STATIC_COMPONENTS: &[ComponentSpec] = &[
    ComponentSpec {
        tag: "mesh",
        type_id: 1,
        attributes: &[
            AttributeSpec::new("src", MarkupType::Text, ""),
            AttributeSpec::choice(
                "type",
                "triangles",
                &["triangles", "tristrips", "points", "lines"],
            ),
        ],
    },
    ComponentSpec {
        tag: "light",
        type_id: 2,
        attributes: &[
            AttributeSpec::choice("model", "point", &["point", "directional", "spot"]),
            AttributeSpec::new("color", MarkupType::Color, "1 1 1"),
            AttributeSpec::new("intensity", MarkupType::Number, "1"),
            AttributeSpec::new("castshadow", MarkupType::Boolean, "false"),
        ],
    },
    ComponentSpec {
        tag: "view",
        type_id: 3,
        attributes: &[
            // Radians
            AttributeSpec::new("fieldofview", MarkupType::Number, "0.785398"),
            AttributeSpec::new("near", MarkupType::Number, "0.1"),
            AttributeSpec::new("far", MarkupType::Number, "1000"),
        ],
    },
    ComponentSpec {
        tag: "material",
        type_id: 4,
        attributes: &[
            AttributeSpec::new("shader", MarkupType::Text, ""),
            AttributeSpec::new("diffusecolor", MarkupType::Color, "1 1 1"),
            AttributeSpec::new("opacity", MarkupType::Number, "1"),
        ],
    },
];

pub const DATA_TYPE_ID: u32 = 5;

pub fn static_component(tag: &str) -> Option<&'static ComponentSpec> {
    STATIC_COMPONENTS.iter().find(|spec| spec.tag == tag)
}

pub fn is_component_tag(tag: &str) -> bool {
    tag == DATA_TAG || static_component(tag).is_some()
}

pub fn component_type_id(tag: &str) -> Option<u32> {
    if tag == DATA_TAG {
        return Some(DATA_TYPE_ID);
    }
    static_component(tag).map(|spec| spec.type_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_class_per_type() {
        for t in MarkupType::ALL {
            let id = t.id();
            let matches = [
                is_atomic(id),
                is_enum(id),
                tuple_arity(id) > 0,
                is_transform(id),
                is_array(id),
            ]
            .iter()
            .filter(|m| **m)
            .count();
            assert_eq!(matches, 1, "{t:?}");
        }
    }

    #[test]
    fn test_value_tags() {
        for t in MarkupType::ALL {
            if let Some(tag) = t.value_tag() {
                assert_eq!(MarkupType::from_value_tag(tag), Some(t));
            }
        }
        assert_eq!(MarkupType::from_value_tag("group"), None);
    }

    #[test]
    fn test_lists() {
        let floats = MarkupType::NumberList.parse(" 1 2.5\n3 ", &[]).unwrap();
        assert_eq!(
            floats,
            AttributeValue::Array(vec!["1".into(), "2.5".into(), "3".into()])
        );
        assert_eq!(MarkupType::NumberList.format(&floats), "1 2.5 3");
        assert!(MarkupType::NumberList.parse("1 x", &[]).is_err());

        let strings = MarkupType::TextList.parse("alpha\n\nbeta gamma\n", &[]).unwrap();
        assert_eq!(
            strings,
            AttributeValue::Array(vec!["alpha".into(), "beta gamma".into()])
        );
        assert_eq!(MarkupType::TextList.format(&strings), "alpha\nbeta gamma");
    }

    #[test]
    fn test_enumeration_choices() {
        let spec = static_component("light").unwrap().attribute("model").unwrap();
        assert_eq!(spec.valid_values().unwrap().len(), 3);
        assert!(MarkupType::Enumeration
            .parse("spot", spec.choices)
            .is_ok());
        assert!(matches!(
            MarkupType::Enumeration.parse("area", spec.choices),
            Err(CodecError::EnumValue { .. })
        ));
        assert!(!MarkupType::Enumeration.accepts(&AttributeValue::String("area".into()), spec.choices));
    }

    #[test]
    fn test_defaults_parse() {
        for spec in STATIC_COMPONENTS.iter().chain(std::iter::once(&FIXED_COMPONENT)) {
            for attribute in spec.attributes {
                assert!(
                    attribute
                        .markup_type
                        .parse(attribute.default, attribute.choices)
                        .is_ok(),
                    "{}.{}",
                    spec.tag,
                    attribute.name
                );
            }
        }
        for t in MarkupType::ALL {
            assert!(t.parse(t.default_text(), &[]).is_ok(), "{t:?}");
        }
    }

    #[test]
    fn test_component_tags() {
        assert!(is_component_tag("mesh"));
        assert!(is_component_tag("data"));
        assert!(!is_component_tag("group"));
        assert_eq!(component_type_id("view"), Some(3));
    }
}
