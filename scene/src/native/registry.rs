//! Component registry for the native backend
//!
//! Every component type the native scene can instantiate is registered here
//! with its numeric type id, field layout and type-erased accessors into the
//! `hecs` world. The dynamic component type has no typed storage; its
//! attributes live in [`DynamicComponents`](super::components::DynamicComponents).

use super::components::{
    Camera, Light, Mesh, Name, Placeable, TypedComponent, DYNAMIC_COMPONENT_NAME,
    DYNAMIC_COMPONENT_TYPE_ID,
};
use super::field_access::{descriptor, FieldDescriptor};
use crate::attribute_types::AttributeValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Type alias for add default component function
pub type AddDefaultFn =
    Arc<dyn Fn(&mut hecs::World, hecs::Entity) -> Result<(), hecs::NoSuchEntity> + Send + Sync>;

/// Type alias for remove component function, true if a component was removed
pub type RemoveFn = Arc<dyn Fn(&mut hecs::World, hecs::Entity) -> bool + Send + Sync>;

/// Type alias for component presence check
pub type HasFn = Arc<dyn Fn(&hecs::World, hecs::Entity) -> bool + Send + Sync>;

/// Type alias for field getter
pub type GetFieldFn =
    Arc<dyn Fn(&hecs::World, hecs::Entity, &str) -> Option<AttributeValue> + Send + Sync>;

/// Type alias for field setter, true if the field was set
pub type SetFieldFn =
    Arc<dyn Fn(&mut hecs::World, hecs::Entity, &str, AttributeValue) -> bool + Send + Sync>;

/// Type-erased accessors for a typed component stored in the world
pub struct StaticStorage {
    pub add_default: AddDefaultFn,
    pub remove: RemoveFn,
    pub has: HasFn,
    pub get_field: GetFieldFn,
    pub set_field: SetFieldFn,
}

/// Metadata for a component type
pub struct ComponentMetadata {
    /// Type name without prefix
    pub name: &'static str,

    /// Numeric type id
    pub type_id: u32,

    /// Field layout of typed components, empty for the dynamic type
    pub fields: &'static [FieldDescriptor],

    /// Accessors into the world, `None` for the dynamic type
    pub storage: Option<StaticStorage>,
}

impl ComponentMetadata {
    /// Create metadata for a typed component
    pub fn new<T: TypedComponent>() -> Self {
        Self {
            name: T::component_name(),
            type_id: T::component_type_id(),
            fields: T::fields(),
            storage: Some(StaticStorage {
                add_default: Arc::new(|world: &mut hecs::World, entity: hecs::Entity| {
                    world.insert_one(entity, T::default())
                }),
                remove: Arc::new(|world: &mut hecs::World, entity: hecs::Entity| {
                    world.remove_one::<T>(entity).is_ok()
                }),
                has: Arc::new(|world: &hecs::World, entity: hecs::Entity| {
                    world.get::<&T>(entity).is_ok()
                }),
                get_field: Arc::new(|world: &hecs::World, entity: hecs::Entity, field: &str| {
                    world.get::<&T>(entity).ok()?.get_field(field)
                }),
                set_field: Arc::new(
                    |world: &mut hecs::World, entity: hecs::Entity, field: &str, value| {
                        match world.query_one_mut::<&mut T>(entity) {
                            Ok(component) => component.set_field(field, value),
                            Err(_) => false,
                        }
                    },
                ),
            }),
        }
    }

    /// Create metadata for the runtime-extensible component type
    pub fn dynamic(name: &'static str, type_id: u32) -> Self {
        Self {
            name,
            type_id,
            fields: &[],
            storage: None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.storage.is_none()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        descriptor(self.fields, name)
    }
}

impl std::fmt::Debug for ComponentMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentMetadata")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("fields", &self.fields.iter().map(|f| f.name).collect::<Vec<_>>())
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

/// Registry of component types the native scene can instantiate
#[derive(Default)]
pub struct ComponentRegistry {
    /// Maps type ids to metadata
    metadata: HashMap<u32, ComponentMetadata>,
    /// Maps type names to type ids for lookup
    name_to_type: HashMap<String, u32>,
}

impl ComponentRegistry {
    /// Create a new empty component registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with full metadata
    pub fn register_with_metadata(&mut self, metadata: ComponentMetadata) {
        let name = metadata.name.to_string();
        let type_id = metadata.type_id;

        debug!(
            component_name = %name,
            type_id,
            field_count = metadata.fields.len(),
            dynamic = metadata.is_dynamic(),
            "Registered component with metadata"
        );

        self.name_to_type.insert(name, type_id);
        self.metadata.insert(type_id, metadata);
    }

    pub fn get_metadata(&self, type_id: u32) -> Option<&ComponentMetadata> {
        self.metadata.get(&type_id)
    }

    /// Get metadata by unprefixed type name
    pub fn get_metadata_by_name(&self, name: &str) -> Option<&ComponentMetadata> {
        self.name_to_type
            .get(name)
            .and_then(|type_id| self.metadata.get(type_id))
    }

    /// Iterate over all registered component metadata, ordered by type name
    pub fn iter_metadata(&self) -> impl Iterator<Item = &ComponentMetadata> {
        let mut all: Vec<_> = self.metadata.values().collect();
        all.sort_by_key(|meta| meta.name);
        all.into_iter()
    }

    /// Get a list of all registered component names
    pub fn component_names(&self) -> Vec<&'static str> {
        self.iter_metadata().map(|meta| meta.name).collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.name_to_type.contains_key(name)
    }

    /// Get the number of registered component types
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Create a registry with all default components registered
    pub fn with_default_components() -> Self {
        let mut registry = Self::new();

        Name::register(&mut registry);
        Placeable::register(&mut registry);
        Mesh::register(&mut registry);
        Light::register(&mut registry);
        Camera::register(&mut registry);
        registry.register_with_metadata(ComponentMetadata::dynamic(
            DYNAMIC_COMPONENT_NAME,
            DYNAMIC_COMPONENT_TYPE_ID,
        ));

        debug!(
            component_count = registry.len(),
            "Created registry with default components"
        );

        registry
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("registered_types", &self.component_names())
            .finish()
    }
}
