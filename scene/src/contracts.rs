//! Capability contracts every scene backend implements
//!
//! A generic consumer only talks to [`Scene`], [`Entity`], [`Component`] and
//! [`Attribute`] trait objects. Lookups that find nothing and operations on
//! expired handles resolve to `None`, an empty list or `false`; only backend
//! faults surface as [`SceneError`].

use crate::attribute_types::{AttributeTypeSystem, AttributeValue, EnumValue};
use crate::callbacks::{CallbackId, CallbackRegistry};
use crate::error::SceneError;
use crate::raycast::RaycastResult;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Scene-unique entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity-unique component identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Id of the implicit per-entity component
    pub const FIXED: ComponentId = ComponentId(0);
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replication intent of a newly created entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locality {
    #[default]
    Replicated,
    Local,
}

/// A component type a backend can instantiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentTypeInfo {
    pub name: String,
    pub type_id: u32,
}

pub type SceneRef = Rc<dyn Scene>;
pub type EntityRef = Rc<dyn Entity>;
pub type ComponentRef = Rc<dyn Component>;
pub type AttributeRef = Rc<dyn Attribute>;

/// Type alias for a subscribed event handler
pub type EventHandler = Box<dyn Fn(&SceneEvent)>;

/// Registry keyed by event kind carrying scene events
pub type EventRegistry = CallbackRegistry<EventKind, SceneEvent>;

/// Kinds of domain events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntityCreated,
    EntityRemoved,
    ComponentCreated,
    ComponentRemoved,
    AttributeAdded,
    AttributeChanged,
    AttributeAboutToBeRemoved,
}

impl EventKind {
    /// Kinds delivered at scene level
    pub fn is_canonical(self) -> bool {
        matches!(
            self,
            EventKind::EntityCreated
                | EventKind::EntityRemoved
                | EventKind::ComponentCreated
                | EventKind::ComponentRemoved
                | EventKind::AttributeChanged
        )
    }

    /// Kinds delivered per entity
    pub fn is_entity_event(self) -> bool {
        matches!(self, EventKind::ComponentCreated | EventKind::ComponentRemoved)
    }

    /// Kinds delivered per component
    pub fn is_component_event(self) -> bool {
        matches!(
            self,
            EventKind::AttributeAdded
                | EventKind::AttributeChanged
                | EventKind::AttributeAboutToBeRemoved
        )
    }
}

/// A domain event with the handles it concerns
#[derive(Clone)]
pub enum SceneEvent {
    EntityCreated {
        entity: EntityRef,
    },
    EntityRemoved {
        entity: EntityRef,
    },
    ComponentCreated {
        entity: EntityRef,
        component: ComponentRef,
    },
    ComponentRemoved {
        entity: EntityRef,
        component: ComponentRef,
    },
    AttributeAdded {
        component: ComponentRef,
        attribute: AttributeRef,
    },
    AttributeChanged {
        entity: EntityRef,
        component: ComponentRef,
        attribute: AttributeRef,
    },
    AttributeAboutToBeRemoved {
        component: ComponentRef,
        attribute: AttributeRef,
    },
}

impl SceneEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SceneEvent::EntityCreated { .. } => EventKind::EntityCreated,
            SceneEvent::EntityRemoved { .. } => EventKind::EntityRemoved,
            SceneEvent::ComponentCreated { .. } => EventKind::ComponentCreated,
            SceneEvent::ComponentRemoved { .. } => EventKind::ComponentRemoved,
            SceneEvent::AttributeAdded { .. } => EventKind::AttributeAdded,
            SceneEvent::AttributeChanged { .. } => EventKind::AttributeChanged,
            SceneEvent::AttributeAboutToBeRemoved { .. } => EventKind::AttributeAboutToBeRemoved,
        }
    }

    /// Id of the entity the event concerns, if it names one
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            SceneEvent::EntityCreated { entity }
            | SceneEvent::EntityRemoved { entity }
            | SceneEvent::ComponentCreated { entity, .. }
            | SceneEvent::ComponentRemoved { entity, .. }
            | SceneEvent::AttributeChanged { entity, .. } => Some(entity.id()),
            SceneEvent::AttributeAdded { component, .. }
            | SceneEvent::AttributeAboutToBeRemoved { component, .. } => Some(component.parent_id()),
        }
    }

    /// Name of the attribute the event concerns, if any
    pub fn attribute_name(&self) -> Option<String> {
        match self {
            SceneEvent::AttributeAdded { attribute, .. }
            | SceneEvent::AttributeChanged { attribute, .. }
            | SceneEvent::AttributeAboutToBeRemoved { attribute, .. } => Some(attribute.name()),
            _ => None,
        }
    }
}

impl fmt::Debug for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SceneEvent");
        s.field("kind", &self.kind());
        if let Some(id) = self.entity_id() {
            s.field("entity", &id);
        }
        if let Some(name) = self.attribute_name() {
            s.field("attribute", &name);
        }
        s.finish()
    }
}

/// Object an event subscription was made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Scene,
    Entity(EntityId),
    Component(EntityId, ComponentId),
}

/// Opaque token returned by a subscription, required to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventToken {
    target: EventTarget,
    kind: EventKind,
    callback: CallbackId,
}

impl EventToken {
    pub fn new(target: EventTarget, kind: EventKind, callback: CallbackId) -> Self {
        Self {
            target,
            kind,
            callback,
        }
    }

    pub fn target(&self) -> EventTarget {
        self.target
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn callback(&self) -> CallbackId {
        self.callback
    }
}

/// Scene-level capabilities
pub trait Scene: AttributeTypeSystem {
    /// Short backend identifier used in logs
    fn backend_name(&self) -> &'static str;

    /// Root-level entities in creation order
    fn entities(&self) -> Vec<EntityRef>;

    fn entity_by_id(&self, id: EntityId) -> Option<EntityRef>;

    /// Create an entity pre-populated with the named component types
    ///
    /// Unknown component type names are skipped with a warning. Returns `None`
    /// if `parent` does not name a live entity.
    fn create_entity(
        &self,
        components: &[&str],
        locality: Locality,
        parent: Option<EntityId>,
    ) -> Option<EntityRef>;

    /// Remove an entity and its descendants; false if the id is unknown
    fn remove_entity(&self, id: EntityId) -> bool;

    /// Move an entity under `parent`, or to the root when `None`
    fn set_parent(&self, id: EntityId, parent: Option<EntityId>) -> Result<bool, SceneError>;

    /// Component types this backend can instantiate
    fn component_types(&self) -> Vec<ComponentTypeInfo>;

    /// Cast a ray from viewport pixel coordinates into the scene
    fn raycast(&self, x: f32, y: f32) -> Option<RaycastResult>;

    fn component_name_with_prefix(&self, type_name: &str) -> String;

    fn component_name_without_prefix(&self, type_name: &str) -> String;

    fn component_name_human_readable(&self, type_name: &str) -> String;

    /// Subscribe to a canonical event kind; `None` for other kinds
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken>;

    /// Reverse a subscription made on the scene or on any entity or component
    fn unsubscribe(&self, token: &EventToken) -> bool;

    fn on_entity_created(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::EntityCreated, handler)
    }

    fn on_entity_removed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::EntityRemoved, handler)
    }

    fn on_component_created(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::ComponentCreated, handler)
    }

    fn on_component_removed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::ComponentRemoved, handler)
    }

    fn on_attribute_changed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::AttributeChanged, handler)
    }

    /// Every live entity, depth first
    fn all_entities(&self) -> Vec<EntityRef> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityRef> = self.entities().into_iter().rev().collect();
        while let Some(entity) = stack.pop() {
            stack.extend(entity.children().into_iter().rev());
            out.push(entity);
        }
        out
    }

    /// Report a problem on the scene's log channel
    fn log_warning(&self, message: &str) {
        warn!(backend = self.backend_name(), "{message}");
    }
}

/// Entity-level capabilities
pub trait Entity {
    fn id(&self) -> EntityId;

    fn expired(&self) -> bool;

    /// Entity name, empty when unnamed or expired
    fn name(&self) -> String;

    fn set_name(&self, name: &str) -> bool;

    fn is_local(&self) -> bool;

    fn is_temporary(&self) -> bool;

    fn set_temporary(&self, temporary: bool) -> bool;

    fn parent_id(&self) -> Option<EntityId>;

    /// Direct children in creation order
    fn children(&self) -> Vec<EntityRef>;

    /// All components, the fixed component first
    fn components(&self) -> Vec<ComponentRef>;

    fn num_components(&self) -> usize {
        self.components().len()
    }

    /// The implicit component holding intrinsic entity properties
    fn fixed_component(&self) -> Option<ComponentRef> {
        self.components().into_iter().find(|c| c.is_fixed())
    }

    /// Create a component; `None` if the type is unknown, the name is taken or
    /// the entity is expired
    fn create_component(
        &self,
        type_name: &str,
        name: Option<&str>,
        local: bool,
    ) -> Option<ComponentRef>;

    /// Look up a component by type and name (any name when `None`)
    fn component(&self, type_name: &str, name: Option<&str>) -> Option<ComponentRef>;

    fn has_component(&self, type_name: &str, name: Option<&str>) -> bool {
        self.component(type_name, name).is_some()
    }

    fn component_by_id(&self, id: ComponentId) -> Option<ComponentRef>;

    /// Remove a component; the fixed component can never be removed
    fn remove_component(&self, id: ComponentId) -> bool;

    /// Subscribe to a per-entity event kind; `None` for other kinds or when expired
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken>;

    fn unsubscribe(&self, token: &EventToken) -> bool;

    fn on_component_created(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::ComponentCreated, handler)
    }

    fn on_component_removed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::ComponentRemoved, handler)
    }
}

/// Component-level capabilities
pub trait Component {
    fn id(&self) -> ComponentId;

    fn expired(&self) -> bool;

    fn name(&self) -> String;

    /// Backend type key, without prefix
    fn type_name(&self) -> String;

    fn type_id(&self) -> u32;

    /// Id of the owning entity
    fn parent_id(&self) -> EntityId;

    fn is_fixed(&self) -> bool;

    /// Whether attributes can be added and removed at runtime
    fn is_dynamic(&self) -> bool;

    fn is_temporary(&self) -> bool;

    fn set_temporary(&self, temporary: bool) -> bool;

    fn attributes(&self) -> Vec<AttributeRef>;

    fn num_attributes(&self) -> usize {
        self.attributes().len()
    }

    /// Add an attribute; `None` if the component is not dynamic, the name is
    /// taken, the type is unknown or the component is expired
    fn create_attribute(&self, type_id: u32, name: &str) -> Option<AttributeRef>;

    fn remove_attribute(&self, name: &str) -> bool;

    fn remove_attribute_by_index(&self, index: usize) -> bool {
        match self.attribute_by_index(index) {
            Some(attribute) => self.remove_attribute(&attribute.name()),
            None => false,
        }
    }

    fn attribute(&self, name: &str) -> Option<AttributeRef>;

    fn attribute_by_index(&self, index: usize) -> Option<AttributeRef> {
        self.attributes().into_iter().nth(index)
    }

    /// Subscribe to a per-component event kind; `None` for other kinds or when expired
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken>;

    fn unsubscribe(&self, token: &EventToken) -> bool;

    fn on_attribute_added(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::AttributeAdded, handler)
    }

    fn on_attribute_changed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::AttributeChanged, handler)
    }

    fn on_attribute_about_to_be_removed(&self, handler: EventHandler) -> Option<EventToken> {
        self.subscribe(EventKind::AttributeAboutToBeRemoved, handler)
    }
}

/// Attribute-level capabilities
pub trait Attribute {
    fn name(&self) -> String;

    fn type_id(&self) -> u32;

    fn expired(&self) -> bool;

    /// Position within the owning component
    fn index(&self) -> Option<usize>;

    /// Owning component; a lookup relation, never an owning one
    fn owner(&self) -> Option<ComponentRef>;

    fn get(&self) -> Option<AttributeValue>;

    /// Store a value; false if the value has the wrong shape or the handle expired
    fn set(&self, value: AttributeValue) -> bool;

    /// Finite set of allowed values, `None` when unconstrained
    fn valid_values(&self) -> Option<Vec<EnumValue>> {
        None
    }

    /// Value in the backend's string form
    fn to_display_string(&self) -> Option<String>;

    /// Parse `text` in the backend's string form and store it
    fn set_from_string(&self, text: &str) -> Result<bool, SceneError>;
}

/// Dispatch an event on a registry, logging the fan-out
pub(crate) fn dispatch(registry: &EventRegistry, event: &SceneEvent) {
    tracing::trace!(event = ?event, "Dispatching scene event");
    registry.callback(event.kind(), event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_scopes() {
        assert!(EventKind::EntityCreated.is_canonical());
        assert!(EventKind::AttributeChanged.is_canonical());
        assert!(!EventKind::AttributeAdded.is_canonical());

        assert!(EventKind::ComponentCreated.is_entity_event());
        assert!(!EventKind::EntityCreated.is_entity_event());

        assert!(EventKind::AttributeAboutToBeRemoved.is_component_event());
        assert!(!EventKind::ComponentRemoved.is_component_event());
    }

    #[test]
    fn test_token_accessors() {
        let registry = EventRegistry::new();
        let callback = registry.register_callback(EventKind::EntityCreated, |_| {});
        let token = EventToken::new(
            EventTarget::Entity(EntityId(4)),
            EventKind::ComponentCreated,
            callback,
        );
        assert_eq!(token.target(), EventTarget::Entity(EntityId(4)));
        assert_eq!(token.kind(), EventKind::ComponentCreated);
        assert_eq!(token.callback(), callback);
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(EntityId(12).to_string(), "12");
        assert_eq!(ComponentId::FIXED.to_string(), "0");
    }
}
