//! Components stored in the native backend's `hecs` world

use super::field_access::{descriptor, tuple_into, FieldAccess, FieldDescriptor};
use super::registry::{ComponentMetadata, ComponentRegistry};
use super::types::NativeType;
use crate::attribute_types::{AttributeValue, TransformValue};
use crate::contracts::ComponentId;

/// Trait for typed components that can be registered and edited by name
pub trait TypedComponent: FieldAccess + Default + Send + Sync + 'static {
    /// Get the name of this component type, without prefix
    fn component_name() -> &'static str;

    /// Numeric component type id
    fn component_type_id() -> u32;

    /// Register this component type with the registry
    fn register(registry: &mut ComponentRegistry) {
        registry.register_with_metadata(ComponentMetadata::new::<Self>());
    }
}

/// Validate `value` against the field layout and normalize it for storage
fn checked(fields: &[FieldDescriptor], field_name: &str, value: AttributeValue) -> Option<AttributeValue> {
    let field = descriptor(fields, field_name)?;
    if !field.accepts(&value) {
        return None;
    }
    Some(field.native_type.normalize(value))
}

/// Human-facing entity name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Name {
    pub name: String,
    pub description: String,
}

const NAME_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", NativeType::String),
    FieldDescriptor::new("description", NativeType::String),
];

impl FieldAccess for Name {
    fn fields() -> &'static [FieldDescriptor] {
        NAME_FIELDS
    }

    fn get_field(&self, field_name: &str) -> Option<AttributeValue> {
        match field_name {
            "name" => Some(AttributeValue::String(self.name.clone())),
            "description" => Some(AttributeValue::String(self.description.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool {
        let Some(AttributeValue::String(text)) = checked(NAME_FIELDS, field_name, value) else {
            return false;
        };
        match field_name {
            "name" => self.name = text,
            "description" => self.description = text,
            _ => return false,
        }
        true
    }
}

impl TypedComponent for Name {
    fn component_name() -> &'static str {
        "Name"
    }

    fn component_type_id() -> u32 {
        26
    }
}

/// Placement of an entity in the world
#[derive(Debug, Clone, PartialEq)]
pub struct Placeable {
    pub transform: TransformValue,
    pub visible: bool,
}

impl Default for Placeable {
    fn default() -> Self {
        Self {
            transform: TransformValue::default(),
            visible: true,
        }
    }
}

const PLACEABLE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("transform", NativeType::Transform),
    FieldDescriptor::new("visible", NativeType::Bool),
];

impl FieldAccess for Placeable {
    fn fields() -> &'static [FieldDescriptor] {
        PLACEABLE_FIELDS
    }

    fn get_field(&self, field_name: &str) -> Option<AttributeValue> {
        match field_name {
            "transform" => Some(AttributeValue::Transform(self.transform)),
            "visible" => Some(AttributeValue::Bool(self.visible)),
            _ => None,
        }
    }

    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool {
        match checked(PLACEABLE_FIELDS, field_name, value) {
            // Scale never goes negative
            Some(AttributeValue::Transform(t)) => self.transform = TransformValue::from_fields(t.fields()),
            Some(AttributeValue::Bool(v)) => self.visible = v,
            _ => return false,
        }
        true
    }
}

impl TypedComponent for Placeable {
    fn component_name() -> &'static str {
        "Placeable"
    }

    fn component_type_id() -> u32 {
        20
    }
}

/// Renderable mesh reference
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub mesh_ref: String,
    pub material_refs: Vec<String>,
    pub cast_shadows: bool,
    pub draw_distance: f64,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            mesh_ref: String::new(),
            material_refs: Vec::new(),
            cast_shadows: false,
            draw_distance: 0.0,
        }
    }
}

const MESH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("meshRef", NativeType::AssetReference),
    FieldDescriptor::new("materialRefs", NativeType::AssetReferenceList),
    FieldDescriptor::new("castShadows", NativeType::Bool),
    FieldDescriptor::new("drawDistance", NativeType::Real),
];

impl FieldAccess for Mesh {
    fn fields() -> &'static [FieldDescriptor] {
        MESH_FIELDS
    }

    fn get_field(&self, field_name: &str) -> Option<AttributeValue> {
        match field_name {
            "meshRef" => Some(AttributeValue::String(self.mesh_ref.clone())),
            "materialRefs" => Some(AttributeValue::Array(self.material_refs.clone())),
            "castShadows" => Some(AttributeValue::Bool(self.cast_shadows)),
            "drawDistance" => Some(AttributeValue::Real(self.draw_distance)),
            _ => None,
        }
    }

    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool {
        match checked(MESH_FIELDS, field_name, value) {
            Some(AttributeValue::String(v)) => self.mesh_ref = v,
            Some(AttributeValue::Array(v)) => self.material_refs = v,
            Some(AttributeValue::Bool(v)) => self.cast_shadows = v,
            Some(AttributeValue::Real(v)) => self.draw_distance = v,
            _ => return false,
        }
        true
    }
}

impl TypedComponent for Mesh {
    fn component_name() -> &'static str {
        "Mesh"
    }

    fn component_type_id() -> u32 {
        17
    }
}

/// Light source kinds
pub const LIGHT_TYPES: &[(&str, i64)] = &[("Point", 0), ("Spot", 1), ("Directional", 2)];

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: i64,
    pub diff_color: [f64; 4],
    pub brightness: f64,
    pub range: f64,
    pub cast_shadows: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: 0,
            diff_color: [1.0, 1.0, 1.0, 1.0],
            brightness: 1.0,
            range: 25.0,
            cast_shadows: false,
        }
    }
}

const LIGHT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::enumeration("type", LIGHT_TYPES),
    FieldDescriptor::new("diffColor", NativeType::Color),
    FieldDescriptor::new("brightness", NativeType::Real),
    FieldDescriptor::new("range", NativeType::Real),
    FieldDescriptor::new("castShadows", NativeType::Bool),
];

impl FieldAccess for Light {
    fn fields() -> &'static [FieldDescriptor] {
        LIGHT_FIELDS
    }

    fn get_field(&self, field_name: &str) -> Option<AttributeValue> {
        match field_name {
            "type" => Some(AttributeValue::Int(self.light_type)),
            "diffColor" => Some(AttributeValue::Tuple(self.diff_color.to_vec())),
            "brightness" => Some(AttributeValue::Real(self.brightness)),
            "range" => Some(AttributeValue::Real(self.range)),
            "castShadows" => Some(AttributeValue::Bool(self.cast_shadows)),
            _ => None,
        }
    }

    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool {
        let Some(value) = checked(LIGHT_FIELDS, field_name, value) else {
            return false;
        };
        match (field_name, value) {
            ("type", AttributeValue::Int(v)) => self.light_type = v,
            ("diffColor", color) => match tuple_into::<4>(&color) {
                Some(c) => self.diff_color = c,
                None => return false,
            },
            ("brightness", AttributeValue::Real(v)) => self.brightness = v,
            ("range", AttributeValue::Real(v)) => self.range = v,
            ("castShadows", AttributeValue::Bool(v)) => self.cast_shadows = v,
            _ => return false,
        }
        true
    }
}

impl TypedComponent for Light {
    fn component_name() -> &'static str {
        "Light"
    }

    fn component_type_id() -> u32 {
        16
    }
}

/// Perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Degrees
    pub vertical_fov: f64,
    pub near_plane: f64,
    pub far_plane: f64,
    pub up_vector: [f64; 3],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            vertical_fov: 45.0,
            near_plane: 0.1,
            far_plane: 2000.0,
            up_vector: [0.0, 1.0, 0.0],
        }
    }
}

const CAMERA_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("verticalFov", NativeType::Real),
    FieldDescriptor::new("nearPlane", NativeType::Real),
    FieldDescriptor::new("farPlane", NativeType::Real),
    FieldDescriptor::new("upVector", NativeType::Float3),
];

impl FieldAccess for Camera {
    fn fields() -> &'static [FieldDescriptor] {
        CAMERA_FIELDS
    }

    fn get_field(&self, field_name: &str) -> Option<AttributeValue> {
        match field_name {
            "verticalFov" => Some(AttributeValue::Real(self.vertical_fov)),
            "nearPlane" => Some(AttributeValue::Real(self.near_plane)),
            "farPlane" => Some(AttributeValue::Real(self.far_plane)),
            "upVector" => Some(AttributeValue::Tuple(self.up_vector.to_vec())),
            _ => None,
        }
    }

    fn set_field(&mut self, field_name: &str, value: AttributeValue) -> bool {
        let Some(value) = checked(CAMERA_FIELDS, field_name, value) else {
            return false;
        };
        match (field_name, value) {
            ("verticalFov", AttributeValue::Real(v)) => self.vertical_fov = v,
            ("nearPlane", AttributeValue::Real(v)) => self.near_plane = v,
            ("farPlane", AttributeValue::Real(v)) => self.far_plane = v,
            ("upVector", up) => match tuple_into::<3>(&up) {
                Some(v) => self.up_vector = v,
                None => return false,
            },
            _ => return false,
        }
        true
    }
}

impl TypedComponent for Camera {
    fn component_name() -> &'static str {
        "Camera"
    }

    fn component_type_id() -> u32 {
        15
    }
}

/// Type name of the runtime-extensible component
pub const DYNAMIC_COMPONENT_NAME: &str = "DynamicComponent";
pub const DYNAMIC_COMPONENT_TYPE_ID: u32 = 25;

/// Attribute of a dynamic component
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAttribute {
    pub name: String,
    pub native_type: NativeType,
    pub value: AttributeValue,
}

/// Attribute storage of one dynamic component instance
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicData {
    pub id: ComponentId,
    pub attributes: Vec<DynamicAttribute>,
}

impl DynamicData {
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            attributes: Vec::new(),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&DynamicAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut DynamicAttribute> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }
}

/// All dynamic component instances of an entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicComponents(pub Vec<DynamicData>);

impl DynamicComponents {
    pub fn get(&self, id: ComponentId) -> Option<&DynamicData> {
        self.0.iter().find(|d| d.id == id)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut DynamicData> {
        self.0.iter_mut().find(|d| d.id == id)
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<DynamicData> {
        let index = self.0.iter().position(|d| d.id == id)?;
        Some(self.0.remove(index))
    }
}

/// Bookkeeping for one component instance on an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSlot {
    pub id: ComponentId,
    pub type_id: u32,
    pub name: String,
    pub local: bool,
    pub temporary: bool,
}

/// Per-entity state that is not a typed component
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub local: bool,
    pub temporary: bool,
    pub next_component_id: u32,
    /// Component instances in creation order
    pub slots: Vec<ComponentSlot>,
}

impl EntityInfo {
    pub fn new(local: bool) -> Self {
        Self {
            local,
            temporary: false,
            next_component_id: 1,
            slots: Vec::new(),
        }
    }

    pub fn slot(&self, id: ComponentId) -> Option<&ComponentSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: ComponentId) -> Option<&mut ComponentSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Reserve the next component id
    pub fn allocate_id(&mut self) -> ComponentId {
        let id = ComponentId(self.next_component_id);
        self.next_component_id += 1;
        id
    }
}

/// Parent entity in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub hecs::Entity);
