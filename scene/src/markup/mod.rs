//! Declarative markup scene graph backend
//!
//! The scene is a [`dom::Document`] whose `group` elements are the entities.
//! Contract operations only mutate the document; every canonical event is
//! produced by an observer that translates the document's mutation records,
//! so edits made directly on the document are announced the same way.

pub mod dom;
pub mod schema;

mod attribute;
mod bridge;
mod component;
mod entity;

pub use attribute::MarkupAttribute;
pub use component::MarkupComponent;
pub use entity::MarkupEntity;

use crate::attribute_types::AttributeTypeSystem;
use crate::codec;
use crate::config::SceneConfig;
use crate::contracts::{
    ComponentTypeInfo, Entity, EntityId, EntityRef, EventHandler, EventKind, EventRegistry,
    EventTarget, EventToken, Locality, Scene,
};
use crate::error::SceneError;
use crate::handle::IdentityTable;
use crate::raycast::{nearest_hit, Ray, RaycastResult, RaycastTarget};
use dom::{Document, Element, NodeId, ObserverId};
use glam::Mat4;
use schema::{DATA_TAG, ENTITY_TAG, LOCAL_ATTRIBUTE, ROOT_TAG};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

pub(crate) fn is_true(element: &Element, attribute: &str) -> bool {
    element.attribute(attribute).as_deref() == Some("true")
}

/// State shared between the scene, its wrappers and the event bridge
pub(crate) struct MarkupShared {
    pub(crate) document: Document,
    pub(crate) config: SceneConfig,
    pub(crate) events: EventRegistry,
    ids: RefCell<IdentityTable<NodeId>>,
    next_local: Cell<u32>,
    wrappers: RefCell<HashMap<EntityId, Rc<MarkupEntity>>>,
    /// Nodes being moved by `set_parent`; their records are not translated
    suppressed: RefCell<HashSet<NodeId>>,
    this: Weak<MarkupShared>,
}

impl MarkupShared {
    /// Strip the configured tag prefix if present
    pub(crate) fn unprefixed<'a>(&self, type_name: &'a str) -> &'a str {
        type_name
            .strip_prefix(self.config.markup_component_prefix.as_str())
            .unwrap_or(type_name)
    }

    pub(crate) fn root(&self) -> Element {
        self.document.root()
    }

    /// Whether `element` is attached under the scene root
    pub(crate) fn in_scene(&self, element: &Element) -> bool {
        self.root().contains(element)
    }

    pub(crate) fn is_suppressed(&self, element: &Element) -> bool {
        self.suppressed.borrow().contains(&element.uid())
    }

    pub(crate) fn entity_id(&self, element: &Element) -> Option<EntityId> {
        self.ids.borrow().get_id(element.uid()).map(EntityId)
    }

    pub(crate) fn resolve(&self, id: EntityId) -> Option<Element> {
        let wrapper = self.wrappers.borrow().get(&id).cloned()?;
        wrapper.element()
    }

    /// Wrapper of an already tracked group
    pub(crate) fn memoized(&self, element: &Element) -> Option<Rc<MarkupEntity>> {
        let id = self.entity_id(element)?;
        let wrapper = self.wrappers.borrow().get(&id).cloned();
        wrapper
    }

    /// Memoized wrapper for a group attached to the scene
    pub(crate) fn wrap(&self, element: &Element) -> Option<Rc<MarkupEntity>> {
        if let Some(wrapper) = self.memoized(element) {
            return Some(wrapper);
        }
        if element.tag() != ENTITY_TAG || !self.in_scene(element) {
            return None;
        }
        let id = self.assign_id(element);
        let wrapper = MarkupEntity::new(self.this.clone(), element.clone(), id);
        self.wrappers.borrow_mut().insert(id, wrapper.clone());
        Some(wrapper)
    }

    fn assign_id(&self, element: &Element) -> EntityId {
        let mut ids = self.ids.borrow_mut();
        if !is_true(element, LOCAL_ATTRIBUTE) {
            return EntityId(ids.id_for(element.uid()));
        }
        loop {
            let id = self.next_local.get();
            self.next_local.set(id.wrapping_add(1));
            if ids.bind(element.uid(), id) {
                return EntityId(id);
            }
        }
    }

    /// Stop tracking a group and expire its handles
    pub(crate) fn forget(&self, element: &Element) {
        let Some(id) = self.ids.borrow_mut().release(element.uid()) else {
            return;
        };
        let wrapper = self.wrappers.borrow_mut().remove(&EntityId(id));
        if let Some(wrapper) = wrapper {
            wrapper.expire();
        }
    }

    /// Every group in the scene, depth first in document order
    pub(crate) fn groups(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut stack: Vec<Element> = self
            .root()
            .children_with_tag(ENTITY_TAG)
            .into_iter()
            .rev()
            .collect();
        while let Some(group) = stack.pop() {
            stack.extend(group.children_with_tag(ENTITY_TAG).into_iter().rev());
            out.push(group);
        }
        out
    }

    fn create_entity(
        &self,
        components: &[&str],
        locality: Locality,
        parent: Option<EntityId>,
    ) -> Option<Rc<MarkupEntity>> {
        let parent = match parent {
            Some(id) => self.resolve(id)?,
            None => self.root(),
        };
        let local = locality == Locality::Local;

        // Built detached, so the bridge sees the finished group once
        let group = self.document.create_element(ENTITY_TAG);
        if local {
            group.set_attribute(LOCAL_ATTRIBUTE, "true");
        }
        let mut attached = 0;
        for type_name in components {
            let tag = self.unprefixed(type_name);
            if !schema::is_component_tag(tag) || !group.children_with_tag(tag).is_empty() {
                warn!(type_name, "Skipping unknown or duplicate component");
                continue;
            }
            let element = self.document.create_element(tag);
            if local {
                element.set_attribute(LOCAL_ATTRIBUTE, "true");
            }
            match group.append_child(&element) {
                Ok(()) => attached += 1,
                Err(err) => warn!(type_name, error = %err, "Failed to attach component"),
            }
        }

        if let Err(err) = parent.append_child(&group) {
            warn!(error = %err, "Failed to attach entity");
            return None;
        }
        let wrapper = self.wrap(&group)?;
        info!(entity = %wrapper.id(), local, components = attached, "Created entity");
        Some(wrapper)
    }

    fn remove_entity(&self, id: EntityId) -> bool {
        let Some(element) = self.resolve(id) else {
            return false;
        };
        match element.remove() {
            Ok(()) => {
                info!(entity = %id, "Removed entity");
                true
            }
            Err(err) => {
                warn!(entity = %id, error = %err, "Failed to remove entity");
                false
            }
        }
    }

    fn set_parent(&self, id: EntityId, parent: Option<EntityId>) -> Result<bool, SceneError> {
        let Some(element) = self.resolve(id) else {
            return Ok(false);
        };
        let new_parent = match parent {
            Some(parent_id) => {
                let Some(parent_element) = self.resolve(parent_id) else {
                    return Ok(false);
                };
                if element.contains(&parent_element) {
                    return Err(SceneError::HierarchyCycle {
                        entity: id.0,
                        parent: parent_id.0,
                    });
                }
                parent_element
            }
            None => self.root(),
        };
        if element.parent().as_ref() == Some(&new_parent) {
            return Ok(true);
        }

        // A move keeps the entity's identity
        self.suppressed.borrow_mut().insert(element.uid());
        let moved = new_parent.append_child(&element);
        self.suppressed.borrow_mut().remove(&element.uid());
        moved?;

        debug!(entity = %id, parent = ?parent, "Reparented entity");
        Ok(true)
    }

    /// World matrix of a group, composing its ancestors' transforms
    pub(crate) fn world_matrix(&self, element: &Element) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(element.clone());
        while let Some(current) = cursor {
            if current.tag() != ENTITY_TAG {
                break;
            }
            let local = current
                .attribute("transform")
                .and_then(|text| codec::parse_transform(&text).ok())
                .map(|transform| transform.to_matrix())
                .unwrap_or(Mat4::IDENTITY);
            matrix = local * matrix;
            cursor = current.parent();
        }
        matrix
    }

    fn raycast(&self, x: f32, y: f32) -> Option<RaycastResult> {
        let groups = self.groups();

        let camera = groups.iter().find_map(|group| {
            let view = group.children_with_tag("view").into_iter().next()?;
            let fov = view
                .attribute("fieldofview")
                .and_then(|text| codec::parse_number(&text).ok())
                .unwrap_or(0.0);
            Some((group.clone(), fov as f32))
        });
        let Some((camera, fov)) = camera else {
            debug!("Raycast without a view entity");
            return None;
        };
        // Markup fields of view are in radians
        let fov = if fov > 0.0 {
            fov
        } else {
            self.config.default_vertical_fov.to_radians()
        };
        let ray = Ray::from_viewport(
            x,
            y,
            self.config.viewport(),
            self.world_matrix(&camera),
            fov,
        )?;

        let mut targets = Vec::new();
        for group in groups {
            let Some(mesh) = group.children_with_tag("mesh").into_iter().next() else {
                continue;
            };
            let Some(entity) = self.wrap(&group) else {
                continue;
            };
            let Some(component) = entity.component_wrapper(&mesh) else {
                continue;
            };
            targets.push(RaycastTarget {
                entity,
                component,
                transform: self.world_matrix(&group),
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
                wrapper.is_some_and(|entity| Entity::unsubscribe(&*entity, token))
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

/// Scene backed by an observable element tree
pub struct MarkupScene {
    shared: Rc<MarkupShared>,
    observer: ObserverId,
}

impl MarkupScene {
    /// Create a scene over an empty document
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self::from_document(Document::new(ROOT_TAG), config)
    }

    /// Create a scene over an existing document
    ///
    /// Groups already in the document are assigned ids in document order.
    pub fn from_document(document: Document, config: SceneConfig) -> Self {
        let shared = Rc::new_cyclic(|this| MarkupShared {
            document,
            next_local: Cell::new(config.local_id_base),
            config,
            events: EventRegistry::new(),
            ids: RefCell::new(IdentityTable::new(1)),
            wrappers: RefCell::new(HashMap::new()),
            suppressed: RefCell::new(HashSet::new()),
            this: this.clone(),
        });
        let observer = bridge::EventBridge::attach(&shared);

        let existing = shared.groups();
        for group in &existing {
            shared.wrap(group);
        }
        info!(entities = existing.len(), "Created markup scene");
        Self { shared, observer }
    }

    pub fn document(&self) -> &Document {
        &self.shared.document
    }

    pub fn config(&self) -> &SceneConfig {
        &self.shared.config
    }

    /// Concrete wrapper for an entity id
    pub fn markup_entity(&self, id: EntityId) -> Option<Rc<MarkupEntity>> {
        let element = self.shared.resolve(id)?;
        self.shared.wrap(&element)
    }
}

impl Default for MarkupScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MarkupScene {
    fn drop(&mut self) {
        self.shared.document.disconnect(self.observer);
    }
}

impl std::fmt::Debug for MarkupScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupScene")
            .field("document", &self.shared.document)
            .field("entities", &self.shared.wrappers.borrow().len())
            .finish()
    }
}

impl AttributeTypeSystem for MarkupScene {
    fn is_attribute_atomic(&self, type_id: u32) -> bool {
        schema::is_atomic(type_id)
    }

    fn is_attribute_enum(&self, type_id: u32) -> bool {
        schema::is_enum(type_id)
    }

    fn is_attribute_tuple(&self, type_id: u32) -> usize {
        schema::tuple_arity(type_id)
    }

    fn is_attribute_color(&self, type_id: u32) -> bool {
        schema::is_color(type_id)
    }

    fn is_attribute_transform(&self, type_id: u32) -> bool {
        schema::is_transform(type_id)
    }

    fn is_attribute_array(&self, type_id: u32) -> bool {
        schema::is_array(type_id)
    }
}

impl Scene for MarkupScene {
    fn backend_name(&self) -> &'static str {
        "markup"
    }

    fn entities(&self) -> Vec<EntityRef> {
        self.shared
            .root()
            .children_with_tag(ENTITY_TAG)
            .iter()
            .filter_map(|group| self.shared.wrap(group))
            .map(|entity| entity as EntityRef)
            .collect()
    }

    fn entity_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.markup_entity(id).map(|entity| entity as EntityRef)
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
        let mut types: Vec<_> = schema::STATIC_COMPONENTS
            .iter()
            .map(|spec| ComponentTypeInfo {
                name: spec.tag.to_string(),
                type_id: spec.type_id,
            })
            .chain(std::iter::once(ComponentTypeInfo {
                name: DATA_TAG.to_string(),
                type_id: schema::DATA_TYPE_ID,
            }))
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    fn raycast(&self, x: f32, y: f32) -> Option<RaycastResult> {
        self.shared.raycast(x, y)
    }

    fn component_name_with_prefix(&self, type_name: &str) -> String {
        format!(
            "{}{}",
            self.shared.config.markup_component_prefix,
            self.shared.unprefixed(type_name)
        )
    }

    fn component_name_without_prefix(&self, type_name: &str) -> String {
        self.shared.unprefixed(type_name).to_string()
    }

    fn component_name_human_readable(&self, type_name: &str) -> String {
        let mut chars = self.shared.unprefixed(type_name).chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
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
