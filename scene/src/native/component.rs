use super::attribute::NativeAttribute;
use super::components::{DynamicAttribute, DynamicComponents, EntityInfo};
use super::entity::NativeEntity;
use super::field_access::FieldDescriptor;
use super::types::NativeType;
use super::NativeShared;
use crate::attribute_types::{AttributeValue, EnumValue};
use crate::contracts::{
    dispatch, AttributeRef, Component, ComponentId, EntityId, EventHandler, EventKind,
    EventRegistry, EventTarget, EventToken, SceneEvent,
};
use crate::handle::Handle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Type name of the implicit per-entity component
pub(crate) const FIXED_COMPONENT_NAME: &str = "Entity";

const FIXED_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("temporary", NativeType::Bool),
    FieldDescriptor::new("parent", NativeType::EntityReference),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComponentKind {
    /// Intrinsic entity properties
    Fixed,
    /// Typed component with a closed field layout
    Typed,
    /// Attributes added and removed at runtime
    Dynamic,
}

/// Component handle of the native backend
pub struct NativeComponent {
    handle: Handle<hecs::Entity>,
    shared: Weak<NativeShared>,
    entity: Weak<NativeEntity>,
    this: Weak<NativeComponent>,
    entity_id: EntityId,
    id: ComponentId,
    name: String,
    type_name: &'static str,
    type_id: u32,
    kind: ComponentKind,
    events: EventRegistry,
    attributes: RefCell<HashMap<String, Rc<NativeAttribute>>>,
}

impl NativeComponent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shared: Weak<NativeShared>,
        entity: Weak<NativeEntity>,
        node: hecs::Entity,
        entity_id: EntityId,
        id: ComponentId,
        name: String,
        type_name: &'static str,
        type_id: u32,
        kind: ComponentKind,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            handle: Handle::new(node),
            shared,
            entity,
            this: this.clone(),
            entity_id,
            id,
            name,
            type_name,
            type_id,
            kind,
            events: EventRegistry::new(),
            attributes: RefCell::new(HashMap::new()),
        })
    }

    fn live(&self) -> Option<(Rc<NativeShared>, hecs::Entity)> {
        let entity = self.handle.get()?;
        let shared = self.shared.upgrade()?;
        Some((shared, entity))
    }

    /// Attribute names and types in index order
    pub(crate) fn layout(&self) -> Vec<(String, NativeType)> {
        let Some((shared, entity)) = self.live() else {
            return Vec::new();
        };
        let describe = |fields: &[FieldDescriptor]| {
            fields
                .iter()
                .map(|field| (field.name.to_string(), field.native_type))
                .collect::<Vec<_>>()
        };
        match self.kind {
            ComponentKind::Fixed => describe(FIXED_FIELDS),
            ComponentKind::Typed => shared
                .registry
                .get_metadata(self.type_id)
                .map(|meta| describe(meta.fields))
                .unwrap_or_default(),
            ComponentKind::Dynamic => {
                let world = shared.world.borrow();
                let layout = world
                    .get::<&DynamicComponents>(entity)
                    .ok()
                    .and_then(|dynamic| {
                        dynamic.get(self.id).map(|data| {
                            data.attributes
                                .iter()
                                .map(|a| (a.name.clone(), a.native_type))
                                .collect()
                        })
                    })
                    .unwrap_or_default();
                layout
            }
        }
    }

    pub(crate) fn enum_values(&self, name: &str) -> Option<Vec<EnumValue>> {
        if self.kind != ComponentKind::Typed {
            return None;
        }
        let shared = self.shared.upgrade()?;
        let meta = shared.registry.get_metadata(self.type_id)?;
        meta.field(name)?.enum_values()
    }

    pub(crate) fn read(&self, name: &str) -> Option<AttributeValue> {
        let (shared, entity) = self.live()?;
        let world = shared.world.borrow();
        let value = match self.kind {
            ComponentKind::Fixed => match name {
                "temporary" => {
                    let info = world.get::<&EntityInfo>(entity).ok()?;
                    Some(AttributeValue::Bool(info.temporary))
                }
                "parent" => {
                    let parent = shared
                        .parent_of(entity)
                        .and_then(|parent| shared.entity_id(parent))
                        .map(|id| id.to_string())
                        .unwrap_or_default();
                    Some(AttributeValue::String(parent))
                }
                _ => None,
            },
            ComponentKind::Typed => {
                let storage = shared
                    .registry
                    .get_metadata(self.type_id)
                    .and_then(|meta| meta.storage.as_ref())?;
                (storage.get_field)(&*world, entity, name)
            }
            ComponentKind::Dynamic => world
                .get::<&DynamicComponents>(entity)
                .ok()
                .and_then(|dynamic| {
                    dynamic
                        .get(self.id)
                        .and_then(|data| data.attribute(name))
                        .map(|attribute| attribute.value.clone())
                }),
        };
        value
    }

    /// Store a value and fire `AttributeChanged` if it differs from the old one
    pub(crate) fn write(&self, name: &str, value: AttributeValue) -> bool {
        let Some((shared, entity)) = self.live() else {
            return false;
        };
        let Some(native_type) = self
            .layout()
            .into_iter()
            .find(|(field, _)| field == name)
            .map(|(_, native_type)| native_type)
        else {
            return false;
        };
        if !native_type.accepts(&value) {
            debug!(attribute = name, value = %value, "Rejected value of the wrong shape");
            return false;
        }
        let value = native_type.normalize(value);
        if self.read(name).as_ref() == Some(&value) {
            return true;
        }

        let stored = match self.kind {
            ComponentKind::Fixed => match (name, value) {
                ("temporary", AttributeValue::Bool(temporary)) => {
                    let mut world = shared.world.borrow_mut();
                    match world.query_one_mut::<&mut EntityInfo>(entity) {
                        Ok(info) => {
                            info.temporary = temporary;
                            true
                        }
                        Err(_) => false,
                    }
                }
                // Reparenting fires its own change notification
                ("parent", AttributeValue::String(text)) => return self.write_parent(&shared, &text),
                _ => false,
            },
            ComponentKind::Typed => match shared
                .registry
                .get_metadata(self.type_id)
                .and_then(|meta| meta.storage.as_ref())
            {
                Some(storage) => {
                    (storage.set_field)(&mut *shared.world.borrow_mut(), entity, name, value)
                }
                None => false,
            },
            ComponentKind::Dynamic => {
                let mut world = shared.world.borrow_mut();
                match world
                    .query_one_mut::<&mut DynamicComponents>(entity)
                    .ok()
                    .and_then(|dynamic| dynamic.get_mut(self.id))
                    .and_then(|data| data.attribute_mut(name))
                {
                    Some(attribute) => {
                        attribute.value = value;
                        true
                    }
                    None => false,
                }
            }
        };

        if stored {
            trace!(entity = %self.entity_id, component = %self.id, attribute = name, "Attribute changed");
            self.notify_changed(name);
        }
        stored
    }

    fn write_parent(&self, shared: &NativeShared, text: &str) -> bool {
        let text = text.trim();
        let parent = if text.is_empty() {
            None
        } else {
            match text.parse::<u32>() {
                Ok(id) => Some(EntityId(id)),
                Err(_) => {
                    warn!(entity = %self.entity_id, parent = text, "Invalid parent reference");
                    return false;
                }
            }
        };
        match shared.set_parent(self.entity_id, parent) {
            Ok(changed) => changed,
            Err(err) => {
                warn!(entity = %self.entity_id, error = %err, "Refused to reparent entity");
                false
            }
        }
    }

    /// Deliver `AttributeChanged` on this component, then at scene level
    pub(crate) fn notify_changed(&self, name: &str) {
        let (Some(component), Some(entity), Some(attribute)) = (
            self.this.upgrade(),
            self.entity.upgrade(),
            self.attribute_wrapper(name),
        ) else {
            return;
        };
        let event = SceneEvent::AttributeChanged {
            entity,
            component,
            attribute,
        };
        dispatch(&self.events, &event);
        if let Some(shared) = self.shared.upgrade() {
            dispatch(&shared.events, &event);
        }
    }

    /// Memoized wrapper for an attribute of this component
    pub(crate) fn attribute_wrapper(&self, name: &str) -> Option<Rc<NativeAttribute>> {
        if let Some(attribute) = self.attributes.borrow().get(name) {
            return Some(attribute.clone());
        }
        let node = self.handle.get()?;
        let (_, native_type) = self.layout().into_iter().find(|(field, _)| field == name)?;
        let attribute = NativeAttribute::new(
            node,
            self.this.clone(),
            name.to_string(),
            native_type,
            self.enum_values(name),
        );
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), attribute.clone());
        Some(attribute)
    }

    pub(crate) fn expire(&self) {
        let attributes: Vec<_> = self.attributes.borrow_mut().drain().map(|(_, a)| a).collect();
        for attribute in attributes {
            attribute.expire();
        }
        self.handle.expire();
        self.events.unregister_all();
    }
}

impl Component for NativeComponent {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn type_name(&self) -> String {
        self.type_name.to_string()
    }

    fn type_id(&self) -> u32 {
        self.type_id
    }

    fn parent_id(&self) -> EntityId {
        self.entity_id
    }

    fn is_fixed(&self) -> bool {
        self.kind == ComponentKind::Fixed
    }

    fn is_dynamic(&self) -> bool {
        self.kind == ComponentKind::Dynamic
    }

    fn is_temporary(&self) -> bool {
        let Some((shared, entity)) = self.live() else {
            return false;
        };
        let world = shared.world.borrow();
        let temporary = match world.get::<&EntityInfo>(entity) {
            Ok(info) if self.kind == ComponentKind::Fixed => info.temporary,
            Ok(info) => info.slot(self.id).is_some_and(|slot| slot.temporary),
            Err(_) => false,
        };
        temporary
    }

    fn set_temporary(&self, temporary: bool) -> bool {
        if self.kind == ComponentKind::Fixed {
            return self.write("temporary", AttributeValue::Bool(temporary));
        }
        let Some((shared, entity)) = self.live() else {
            return false;
        };
        let mut world = shared.world.borrow_mut();
        let updated = match world
            .query_one_mut::<&mut EntityInfo>(entity)
            .ok()
            .and_then(|info| info.slot_mut(self.id))
        {
            Some(slot) => {
                slot.temporary = temporary;
                true
            }
            None => false,
        };
        updated
    }

    fn attributes(&self) -> Vec<AttributeRef> {
        self.layout()
            .into_iter()
            .filter_map(|(name, _)| self.attribute_wrapper(&name))
            .map(|attribute| attribute as AttributeRef)
            .collect()
    }

    fn create_attribute(&self, type_id: u32, name: &str) -> Option<AttributeRef> {
        if self.kind != ComponentKind::Dynamic || name.is_empty() {
            return None;
        }
        let (shared, entity) = self.live()?;
        let native_type = NativeType::from_id(type_id)?;
        {
            let mut world = shared.world.borrow_mut();
            let dynamic = world.query_one_mut::<&mut DynamicComponents>(entity).ok()?;
            let data = dynamic.get_mut(self.id)?;
            if data.position(name).is_some() {
                return None;
            }
            data.attributes.push(DynamicAttribute {
                name: name.to_string(),
                native_type,
                value: native_type.default_value(),
            });
        }
        debug!(component = %self.id, attribute = name, type_name = native_type.name(), "Created attribute");

        let attribute = self.attribute_wrapper(name)?;
        if let Some(component) = self.this.upgrade() {
            dispatch(
                &self.events,
                &SceneEvent::AttributeAdded {
                    component,
                    attribute: attribute.clone(),
                },
            );
        }
        Some(attribute)
    }

    fn remove_attribute(&self, name: &str) -> bool {
        if self.kind != ComponentKind::Dynamic {
            return false;
        }
        let Some((shared, entity)) = self.live() else {
            return false;
        };
        let (Some(component), Some(attribute)) = (self.this.upgrade(), self.attribute_wrapper(name))
        else {
            return false;
        };

        dispatch(
            &self.events,
            &SceneEvent::AttributeAboutToBeRemoved {
                component,
                attribute: attribute.clone(),
            },
        );

        {
            let mut world = shared.world.borrow_mut();
            if let Some(data) = world
                .query_one_mut::<&mut DynamicComponents>(entity)
                .ok()
                .and_then(|dynamic| dynamic.get_mut(self.id))
            {
                data.attributes.retain(|a| a.name != name);
            }
        }
        self.attributes.borrow_mut().remove(name);
        attribute.expire();
        debug!(component = %self.id, attribute = name, "Removed attribute");
        true
    }

    fn attribute(&self, name: &str) -> Option<AttributeRef> {
        self.attribute_wrapper(name)
            .map(|attribute| attribute as AttributeRef)
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken> {
        if !kind.is_component_event() || self.expired() {
            return None;
        }
        let callback = self.events.register_callback(kind, handler);
        Some(EventToken::new(
            EventTarget::Component(self.entity_id, self.id),
            kind,
            callback,
        ))
    }

    fn unsubscribe(&self, token: &EventToken) -> bool {
        token.target() == EventTarget::Component(self.entity_id, self.id)
            && self.events.unregister_callback(token.kind(), token.callback())
    }
}

impl std::fmt::Debug for NativeComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeComponent")
            .field("entity", &self.entity_id)
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute_types::AttributeValue;
    use crate::contracts::{Component, Entity, EventKind, Locality, Scene, SceneEvent};
    use crate::native::types::NativeType;
    use crate::native::NativeScene;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log_events(component: &dyn Component) -> Rc<RefCell<Vec<(EventKind, String)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in [
            EventKind::AttributeAdded,
            EventKind::AttributeChanged,
            EventKind::AttributeAboutToBeRemoved,
        ] {
            let sink = log.clone();
            component
                .subscribe(
                    kind,
                    Box::new(move |event: &SceneEvent| {
                        let name = event.attribute_name().unwrap_or_default();
                        sink.borrow_mut().push((event.kind(), name));
                    }),
                )
                .unwrap();
        }
        log
    }

    #[test]
    fn test_typed_attributes_follow_field_layout() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Light"], Locality::Replicated, None).unwrap();
        let light = entity.component("Light", None).unwrap();

        let names: Vec<_> = light.attributes().iter().map(|a| a.name()).collect();
        assert_eq!(names, ["type", "diffColor", "brightness", "range", "castShadows"]);
        assert_eq!(light.attribute_by_index(2).unwrap().name(), "brightness");
        assert_eq!(light.attribute("range").unwrap().index(), Some(3));
        assert!(!light.is_dynamic());
    }

    #[test]
    fn test_set_fires_change_once() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Light"], Locality::Replicated, None).unwrap();
        let light = entity.component("Light", None).unwrap();
        let log = log_events(light.as_ref());

        let brightness = light.attribute("brightness").unwrap();
        assert!(brightness.set(AttributeValue::Real(4.0)));
        // Same value again is not a modification
        assert!(brightness.set(AttributeValue::Real(4.0)));
        assert_eq!(brightness.get(), Some(AttributeValue::Real(4.0)));

        assert_eq!(
            *log.borrow(),
            vec![(EventKind::AttributeChanged, "brightness".to_string())]
        );
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Camera"], Locality::Replicated, None).unwrap();
        let camera = entity.component("Camera", None).unwrap();
        let up = camera.attribute("upVector").unwrap();

        assert!(!up.set(AttributeValue::Tuple(vec![0.0, 1.0])));
        assert!(!up.set(AttributeValue::Bool(true)));
        assert_eq!(up.get(), Some(AttributeValue::Tuple(vec![0.0, 1.0, 0.0])));
    }

    #[test]
    fn test_static_component_rejects_attribute_changes() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Mesh"], Locality::Replicated, None).unwrap();
        let mesh = entity.component("Mesh", None).unwrap();

        assert!(mesh.create_attribute(NativeType::Real.id(), "speed").is_none());
        assert!(!mesh.remove_attribute("meshRef"));
        assert_eq!(mesh.num_attributes(), 4);
    }

    #[test]
    fn test_dynamic_attribute_lifecycle() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let data = entity
            .create_component("DynamicComponent", Some("stats"), false)
            .unwrap();
        let log = log_events(data.as_ref());

        let speed = data.create_attribute(NativeType::Real.id(), "speed").unwrap();
        assert!(data.create_attribute(NativeType::Real.id(), "speed").is_none());
        assert!(data.create_attribute(999, "other").is_none());
        assert_eq!(speed.get(), Some(AttributeValue::Real(0.0)));

        assert!(speed.set(AttributeValue::Real(2.5)));
        assert!(data.remove_attribute_by_index(0));
        assert!(speed.expired());
        assert_eq!(data.num_attributes(), 0);

        assert_eq!(
            *log.borrow(),
            vec![
                (EventKind::AttributeAdded, "speed".to_string()),
                (EventKind::AttributeChanged, "speed".to_string()),
                (EventKind::AttributeAboutToBeRemoved, "speed".to_string()),
            ]
        );
    }

    #[test]
    fn test_component_temporary_flag() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Mesh"], Locality::Replicated, None).unwrap();
        let mesh = entity.component("Mesh", None).unwrap();

        assert!(!mesh.is_temporary());
        assert!(mesh.set_temporary(true));
        assert!(mesh.is_temporary());
        assert!(!entity.is_temporary());
    }

    #[test]
    fn test_component_token_routes_through_scene() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Name"], Locality::Replicated, None).unwrap();
        let name = entity.component("Name", None).unwrap();

        let token = name.on_attribute_changed(Box::new(|_| {})).unwrap();
        assert!(!entity.unsubscribe(&token));
        assert!(scene.unsubscribe(&token));
        assert!(!name.unsubscribe(&token));
    }
}
