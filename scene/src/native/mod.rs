//! Native entity-component backend
//!
//! Entities live in a `hecs` world. Typed components are stored as `hecs`
//! components and exposed attribute by attribute through their field layout;
//! dynamic components keep their attributes in a per-entity list. Every
//! mutation made through the contracts fires the matching canonical event
//! right after the change.

pub mod components;
pub mod field_access;
pub mod registry;
pub mod types;

mod attribute;
mod component;
mod entity;

pub use attribute::NativeAttribute;
pub use component::NativeComponent;
pub use entity::NativeEntity;

use crate::attribute_types::AttributeTypeSystem;
use crate::config::SceneConfig;
use crate::contracts::{
    dispatch, ComponentId, ComponentTypeInfo, EntityId, EntityRef, EventHandler, EventKind,
    EventRegistry, EventTarget, EventToken, Locality, Scene, SceneEvent,
};
use crate::error::SceneError;
use crate::handle::IdentityTable;
use crate::raycast::{nearest_hit, Ray, RaycastResult, RaycastTarget};
use components::{
    Camera, ComponentSlot, DynamicComponents, DynamicData, EntityInfo, Mesh, Parent, Placeable,
    TypedComponent,
};
use glam::Mat4;
use registry::ComponentRegistry;
use std::cell::{Cell, Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// State shared between the scene and its wrappers
pub(crate) struct NativeShared {
    pub(crate) world: RefCell<hecs::World>,
    pub(crate) registry: ComponentRegistry,
    pub(crate) config: SceneConfig,
    pub(crate) events: EventRegistry,
    ids: RefCell<IdentityTable<hecs::Entity>>,
    next_local: Cell<u32>,
    /// Every live entity in creation order
    order: RefCell<Vec<hecs::Entity>>,
    wrappers: RefCell<HashMap<EntityId, Rc<NativeEntity>>>,
    /// Entities whose removal is being announced
    removing: RefCell<HashSet<hecs::Entity>>,
    this: Weak<NativeShared>,
}

impl NativeShared {
    pub(crate) fn entity_id(&self, entity: hecs::Entity) -> Option<EntityId> {
        self.ids.borrow().get_id(entity).map(EntityId)
    }

    pub(crate) fn resolve(&self, id: EntityId) -> Option<hecs::Entity> {
        let entity = self.ids.borrow().node(id.0)?;
        self.world.borrow().contains(entity).then_some(entity)
    }

    /// Memoized wrapper for a live entity
    pub(crate) fn wrap(&self, entity: hecs::Entity) -> Option<Rc<NativeEntity>> {
        let id = self.entity_id(entity)?;
        if let Some(wrapper) = self.wrappers.borrow().get(&id) {
            return Some(wrapper.clone());
        }
        let wrapper = NativeEntity::new(self.this.clone(), entity, id);
        self.wrappers.borrow_mut().insert(id, wrapper.clone());
        Some(wrapper)
    }

    pub(crate) fn parent_of(&self, entity: hecs::Entity) -> Option<hecs::Entity> {
        self.world
            .borrow()
            .get::<&Parent>(entity)
            .ok()
            .map(|parent| parent.0)
    }

    /// Entities directly under `parent`, or the roots when `None`
    pub(crate) fn children_of(&self, parent: Option<hecs::Entity>) -> Vec<hecs::Entity> {
        let order = self.order.borrow().clone();
        order
            .into_iter()
            .filter(|entity| self.parent_of(*entity) == parent)
            .collect()
    }

    /// Strip the type-name prefix if present
    pub(crate) fn unprefixed<'a>(&self, type_name: &'a str) -> &'a str {
        type_name
            .strip_prefix(self.config.native_component_prefix.as_str())
            .unwrap_or(type_name)
    }

    pub(crate) fn slots(&self, entity: hecs::Entity) -> Vec<ComponentSlot> {
        self.world
            .borrow()
            .get::<&EntityInfo>(entity)
            .map(|info| info.slots.clone())
            .unwrap_or_default()
    }

    fn assign_id(&self, entity: hecs::Entity, local: bool) -> EntityId {
        let mut ids = self.ids.borrow_mut();
        if !local {
            return EntityId(ids.id_for(entity));
        }
        loop {
            let id = self.next_local.get();
            self.next_local.set(id.wrapping_add(1));
            if ids.bind(entity, id) {
                return EntityId(id);
            }
        }
    }

    /// Attach a component without firing events
    ///
    /// Returns `None` if the type is unknown or a component of the same type
    /// and name already exists. Typed components are unique per entity.
    pub(crate) fn attach_component(
        &self,
        entity: hecs::Entity,
        type_name: &str,
        name: Option<&str>,
        local: bool,
    ) -> Option<ComponentId> {
        let meta = self.registry.get_metadata_by_name(self.unprefixed(type_name))?;
        let name = name.unwrap_or_default();
        let mut world = self.world.borrow_mut();

        let taken = world.get::<&EntityInfo>(entity).ok()?.slots.iter().any(|slot| {
            slot.type_id == meta.type_id && (slot.name == name || !meta.is_dynamic())
        });
        if taken {
            debug!(type_name = meta.name, name, "Component name already in use");
            return None;
        }

        let info = world.query_one_mut::<&mut EntityInfo>(entity).ok()?;
        let id = info.allocate_id();
        info.slots.push(ComponentSlot {
            id,
            type_id: meta.type_id,
            name: name.to_string(),
            local,
            temporary: false,
        });

        match &meta.storage {
            Some(storage) => {
                if (storage.add_default)(&mut *world, entity).is_err() {
                    return None;
                }
            }
            None => {
                let has_dynamic = world.get::<&DynamicComponents>(entity).is_ok();
                if has_dynamic {
                    if let Ok(dynamic) = world.query_one_mut::<&mut DynamicComponents>(entity) {
                        dynamic.0.push(DynamicData::new(id));
                    }
                } else if world
                    .insert_one(entity, DynamicComponents(vec![DynamicData::new(id)]))
                    .is_err()
                {
                    return None;
                }
            }
        }

        debug!(type_name = meta.name, component = %id, "Attached component");
        Some(id)
    }

    /// Drop a component's storage and bookkeeping without firing events
    pub(crate) fn detach_component(&self, entity: hecs::Entity, id: ComponentId) -> bool {
        let mut world = self.world.borrow_mut();
        let Ok(info) = world.query_one_mut::<&mut EntityInfo>(entity) else {
            return false;
        };
        let Some(index) = info.slots.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let slot = info.slots.remove(index);

        match self
            .registry
            .get_metadata(slot.type_id)
            .and_then(|meta| meta.storage.as_ref())
        {
            Some(storage) => (storage.remove)(&mut *world, entity),
            None => match world.query_one_mut::<&mut DynamicComponents>(entity) {
                Ok(dynamic) => dynamic.remove(id).is_some(),
                Err(_) => false,
            },
        }
    }

    pub(crate) fn create_entity(
        &self,
        components: &[&str],
        locality: Locality,
        parent: Option<EntityId>,
    ) -> Option<Rc<NativeEntity>> {
        let parent = match parent {
            Some(id) => Some(self.resolve(id)?),
            None => None,
        };
        let local = locality == Locality::Local;

        let entity = {
            let mut world = self.world.borrow_mut();
            match parent {
                Some(parent) => world.spawn((EntityInfo::new(local), Parent(parent))),
                None => world.spawn((EntityInfo::new(local),)),
            }
        };
        let id = self.assign_id(entity, local);
        self.order.borrow_mut().push(entity);

        let mut attached = Vec::new();
        for type_name in components {
            match self.attach_component(entity, type_name, None, local) {
                Some(component) => attached.push(component),
                None => warn!(entity = %id, type_name, "Skipping unknown or duplicate component"),
            }
        }

        let wrapper = self.wrap(entity)?;
        info!(entity = %id, local, components = attached.len(), "Created entity");

        dispatch(
            &self.events,
            &SceneEvent::EntityCreated {
                entity: wrapper.clone(),
            },
        );
        for component in attached {
            if let Some(component) = wrapper.component_wrapper(component) {
                wrapper.fire_component_event(EventKind::ComponentCreated, component);
            }
        }
        Some(wrapper)
    }

    /// Post-order walk: descendants before `entity`
    fn collect_subtree(&self, entity: hecs::Entity, out: &mut Vec<hecs::Entity>) {
        for child in self.children_of(Some(entity)) {
            self.collect_subtree(child, out);
        }
        out.push(entity);
    }

    pub(crate) fn remove_entity(&self, id: EntityId) -> bool {
        let Some(entity) = self.resolve(id) else {
            return false;
        };
        if self.removing.borrow().contains(&entity) {
            debug!(entity = %id, "Entity is already being removed");
            return false;
        }

        let mut doomed = Vec::new();
        self.collect_subtree(entity, &mut doomed);
        self.removing.borrow_mut().extend(doomed.iter().copied());

        for entity in doomed {
            let wrapper = self.wrap(entity);
            if let Some(wrapper) = &wrapper {
                dispatch(
                    &self.events,
                    &SceneEvent::EntityRemoved {
                        entity: wrapper.clone(),
                    },
                );
            }

            let _ = self.world.borrow_mut().despawn(entity);
            self.order.borrow_mut().retain(|e| *e != entity);
            if let Some(released) = self.ids.borrow_mut().release(entity) {
                self.wrappers.borrow_mut().remove(&EntityId(released));
            }
            if let Some(wrapper) = wrapper {
                wrapper.expire();
            }
            self.removing.borrow_mut().remove(&entity);
        }

        info!(entity = %id, "Removed entity");
        true
    }

    pub(crate) fn set_parent(
        &self,
        id: EntityId,
        parent: Option<EntityId>,
    ) -> Result<bool, SceneError> {
        let Some(entity) = self.resolve(id) else {
            return Ok(false);
        };
        let new_parent = match parent {
            Some(parent_id) => match self.resolve(parent_id) {
                Some(parent_entity) => {
                    let mut cursor = Some(parent_entity);
                    while let Some(ancestor) = cursor {
                        if ancestor == entity {
                            return Err(SceneError::HierarchyCycle {
                                entity: id.0,
                                parent: parent_id.0,
                            });
                        }
                        cursor = self.parent_of(ancestor);
                    }
                    Some(parent_entity)
                }
                None => return Ok(false),
            },
            None => None,
        };

        if self.parent_of(entity) == new_parent {
            return Ok(true);
        }

        {
            let mut world = self.world.borrow_mut();
            match new_parent {
                Some(parent_entity) => {
                    if world.insert_one(entity, Parent(parent_entity)).is_err() {
                        return Ok(false);
                    }
                }
                None => {
                    let _ = world.remove_one::<Parent>(entity);
                }
            }
        }
        debug!(entity = %id, parent = ?parent, "Reparented entity");

        if let Some(fixed) = self
            .wrap(entity)
            .and_then(|wrapper| wrapper.component_wrapper(ComponentId::FIXED))
        {
            fixed.notify_changed("parent");
        }
        Ok(true)
    }

    /// World matrix of an entity, composing its ancestors' placements
    pub(crate) fn world_matrix(&self, entity: hecs::Entity) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let local = self
                .world
                .borrow()
                .get::<&Placeable>(current)
                .map(|placeable| placeable.transform.to_matrix())
                .unwrap_or(Mat4::IDENTITY);
            matrix = local * matrix;
            cursor = self.parent_of(current);
        }
        matrix
    }

    fn raycast(&self, x: f32, y: f32) -> Option<RaycastResult> {
        let order = self.order.borrow().clone();

        let camera = order.iter().copied().find_map(|entity| {
            let world = self.world.borrow();
            let camera = world.get::<&Camera>(entity).ok()?;
            Some((entity, camera.vertical_fov as f32))
        });
        let Some((camera, fov)) = camera else {
            debug!("Raycast without a camera entity");
            return None;
        };
        let fov = if fov > 0.0 {
            fov
        } else {
            self.config.default_vertical_fov
        };
        let ray = Ray::from_viewport(
            x,
            y,
            self.config.viewport(),
            self.world_matrix(camera),
            fov.to_radians(),
        )?;

        let mut targets = Vec::new();
        for entity in order {
            let has_mesh = {
                let world = self.world.borrow();
                world.get::<&Mesh>(entity).is_ok() && world.get::<&Placeable>(entity).is_ok()
            };
            if !has_mesh {
                continue;
            }
            let Some(wrapper) = self.wrap(entity) else {
                continue;
            };
            let Some(mesh) = wrapper.component_of_type(Mesh::component_type_id()) else {
                continue;
            };
            targets.push(RaycastTarget {
                entity: wrapper,
                component: mesh,
                transform: self.world_matrix(entity),
            });
        }
        nearest_hit(ray, targets)
    }

    fn unsubscribe(&self, token: &EventToken) -> bool {
        match token.target() {
            EventTarget::Scene => self
                .events
                .unregister_callback(token.kind(), token.callback()),
            EventTarget::Entity(id) => {
                let wrapper = self.wrappers.borrow().get(&id).cloned();
                wrapper.is_some_and(|entity| crate::contracts::Entity::unsubscribe(&*entity, token))
            }
            EventTarget::Component(entity_id, component_id) => {
                let wrapper = self.wrappers.borrow().get(&entity_id).cloned();
                wrapper
                    .and_then(|entity| entity.memoized_component(component_id))
                    .is_some_and(|component| {
                        crate::contracts::Component::unsubscribe(&*component, token)
                    })
            }
        }
    }
}

/// Scene backed by a `hecs` world
pub struct NativeScene {
    shared: Rc<NativeShared>,
}

impl NativeScene {
    /// Create an empty scene with the default component registry
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self::with_registry(config, ComponentRegistry::with_default_components())
    }

    /// Create a scene instantiating the component types of `registry`
    pub fn with_registry(config: SceneConfig, registry: ComponentRegistry) -> Self {
        let shared = Rc::new_cyclic(|this| NativeShared {
            world: RefCell::new(hecs::World::new()),
            registry,
            next_local: Cell::new(config.local_id_base),
            ids: RefCell::new(IdentityTable::new(1)),
            config,
            events: EventRegistry::new(),
            order: RefCell::new(Vec::new()),
            wrappers: RefCell::new(HashMap::new()),
            removing: RefCell::new(HashSet::new()),
            this: this.clone(),
        });
        info!(
            component_types = shared.registry.len(),
            "Created native scene"
        );
        Self { shared }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.shared.registry
    }

    /// Read access to the underlying world
    pub fn world(&self) -> Ref<'_, hecs::World> {
        self.shared.world.borrow()
    }

    /// Concrete wrapper for an entity id
    pub fn native_entity(&self, id: EntityId) -> Option<Rc<NativeEntity>> {
        let entity = self.shared.resolve(id)?;
        self.shared.wrap(entity)
    }
}

impl Default for NativeScene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NativeScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeScene")
            .field("entities", &self.shared.order.borrow().len())
            .field("registry", &self.shared.registry)
            .finish()
    }
}

impl AttributeTypeSystem for NativeScene {
    fn is_attribute_atomic(&self, type_id: u32) -> bool {
        types::is_atomic(type_id)
    }

    fn is_attribute_enum(&self, type_id: u32) -> bool {
        types::is_enum(type_id)
    }

    fn is_attribute_tuple(&self, type_id: u32) -> usize {
        types::tuple_arity(type_id)
    }

    fn is_attribute_color(&self, type_id: u32) -> bool {
        types::is_color(type_id)
    }

    fn is_attribute_transform(&self, type_id: u32) -> bool {
        types::is_transform(type_id)
    }

    fn is_attribute_array(&self, type_id: u32) -> bool {
        types::is_array(type_id)
    }
}

impl Scene for NativeScene {
    fn backend_name(&self) -> &'static str {
        "native"
    }

    fn entities(&self) -> Vec<EntityRef> {
        self.shared
            .children_of(None)
            .into_iter()
            .filter_map(|entity| self.shared.wrap(entity))
            .map(|entity| entity as EntityRef)
            .collect()
    }

    fn entity_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.native_entity(id).map(|entity| entity as EntityRef)
    }

    fn create_entity(
        &self,
        components: &[&str],
        locality: Locality,
        parent: Option<EntityId>,
    ) -> Option<EntityRef> {
        self.shared
            .create_entity(components, locality, parent)
            .map(|entity| entity as EntityRef)
    }

    fn remove_entity(&self, id: EntityId) -> bool {
        self.shared.remove_entity(id)
    }

    fn set_parent(&self, id: EntityId, parent: Option<EntityId>) -> Result<bool, SceneError> {
        self.shared.set_parent(id, parent)
    }

    fn component_types(&self) -> Vec<ComponentTypeInfo> {
        self.shared
            .registry
            .iter_metadata()
            .map(|meta| ComponentTypeInfo {
                name: meta.name.to_string(),
                type_id: meta.type_id,
            })
            .collect()
    }

    fn raycast(&self, x: f32, y: f32) -> Option<RaycastResult> {
        self.shared.raycast(x, y)
    }

    fn component_name_with_prefix(&self, type_name: &str) -> String {
        format!(
            "{}{}",
            self.shared.config.native_component_prefix,
            self.shared.unprefixed(type_name)
        )
    }

    fn component_name_without_prefix(&self, type_name: &str) -> String {
        self.shared.unprefixed(type_name).to_string()
    }

    fn component_name_human_readable(&self, type_name: &str) -> String {
        let mut out = String::new();
        for (i, c) in self.shared.unprefixed(type_name).chars().enumerate() {
            if i > 0 && c.is_uppercase() {
                out.push(' ');
            }
            out.push(c);
        }
        out
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken> {
        if !kind.is_canonical() {
            return None;
        }
        let callback = self.shared.events.register_callback(kind, handler);
        Some(EventToken::new(EventTarget::Scene, kind, callback))
    }

    fn unsubscribe(&self, token: &EventToken) -> bool {
        self.shared.unsubscribe(token)
    }
}
