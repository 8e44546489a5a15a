use super::component::{ComponentKind, NativeComponent, FIXED_COMPONENT_NAME};
use super::components::{EntityInfo, Name};
use super::NativeShared;
use crate::attribute_types::AttributeValue;
use crate::contracts::{
    dispatch, Component, ComponentId, ComponentRef, Entity, EntityId, EntityRef, EventHandler,
    EventKind, EventRegistry, EventTarget, EventToken, SceneEvent,
};
use crate::handle::Handle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Entity handle of the native backend
pub struct NativeEntity {
    handle: Handle<hecs::Entity>,
    shared: Weak<NativeShared>,
    this: Weak<NativeEntity>,
    id: EntityId,
    events: EventRegistry,
    components: RefCell<HashMap<ComponentId, Rc<NativeComponent>>>,
}

impl NativeEntity {
    pub(crate) fn new(shared: Weak<NativeShared>, entity: hecs::Entity, id: EntityId) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            handle: Handle::new(entity),
            shared,
            this: this.clone(),
            id,
            events: EventRegistry::new(),
            components: RefCell::new(HashMap::new()),
        })
    }

    /// Scene state and world entity, `None` once expired
    fn live(&self) -> Option<(Rc<NativeShared>, hecs::Entity)> {
        let entity = self.handle.get()?;
        let shared = self.shared.upgrade()?;
        Some((shared, entity))
    }

    fn read_info<R>(&self, read: impl FnOnce(&EntityInfo) -> R) -> Option<R> {
        let (shared, entity) = self.live()?;
        let world = shared.world.borrow();
        let info = world.get::<&EntityInfo>(entity).ok()?;
        Some(read(&*info))
    }

    /// Memoized wrapper for a component id, built on first access
    pub(crate) fn component_wrapper(&self, id: ComponentId) -> Option<Rc<NativeComponent>> {
        if let Some(component) = self.memoized_component(id) {
            return Some(component);
        }
        let (shared, entity) = self.live()?;

        let component = if id == ComponentId::FIXED {
            NativeComponent::new(
                self.shared.clone(),
                self.this.clone(),
                entity,
                self.id,
                id,
                String::new(),
                FIXED_COMPONENT_NAME,
                0,
                ComponentKind::Fixed,
            )
        } else {
            let slot = shared.slots(entity).into_iter().find(|slot| slot.id == id)?;
            let meta = shared.registry.get_metadata(slot.type_id)?;
            let kind = if meta.is_dynamic() {
                ComponentKind::Dynamic
            } else {
                ComponentKind::Typed
            };
            NativeComponent::new(
                self.shared.clone(),
                self.this.clone(),
                entity,
                self.id,
                id,
                slot.name,
                meta.name,
                meta.type_id,
                kind,
            )
        };

        self.components.borrow_mut().insert(id, component.clone());
        Some(component)
    }

    pub(crate) fn memoized_component(&self, id: ComponentId) -> Option<Rc<NativeComponent>> {
        self.components.borrow().get(&id).cloned()
    }

    /// First component of a numeric type
    pub(crate) fn component_of_type(&self, type_id: u32) -> Option<ComponentRef> {
        let (shared, entity) = self.live()?;
        let slot = shared
            .slots(entity)
            .into_iter()
            .find(|slot| slot.type_id == type_id)?;
        self.component_wrapper(slot.id)
            .map(|component| component as ComponentRef)
    }

    /// Deliver a component event on this entity, then at scene level
    pub(crate) fn fire_component_event(&self, kind: EventKind, component: Rc<NativeComponent>) {
        let Some(entity) = self.this.upgrade() else {
            return;
        };
        let event = match kind {
            EventKind::ComponentCreated => SceneEvent::ComponentCreated {
                entity,
                component,
            },
            EventKind::ComponentRemoved => SceneEvent::ComponentRemoved {
                entity,
                component,
            },
            _ => return,
        };
        dispatch(&self.events, &event);
        if let Some(shared) = self.shared.upgrade() {
            dispatch(&shared.events, &event);
        }
    }

    /// Clear the backend pointer of this entity and everything it owns
    pub(crate) fn expire(&self) {
        let components: Vec<_> = self.components.borrow_mut().drain().map(|(_, c)| c).collect();
        for component in components {
            component.expire();
        }
        self.handle.expire();
        self.events.unregister_all();
        debug!(entity = %self.id, "Entity handle expired");
    }
}

impl Entity for NativeEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn name(&self) -> String {
        let Some((shared, entity)) = self.live() else {
            return String::new();
        };
        let world = shared.world.borrow();
        let name = world
            .get::<&Name>(entity)
            .map(|name| name.name.clone())
            .unwrap_or_default();
        name
    }

    fn set_name(&self, name: &str) -> bool {
        if self.expired() {
            return false;
        }
        let component = match self.component("Name", None) {
            Some(component) => component,
            None => match self.create_component("Name", None, false) {
                Some(component) => component,
                None => return false,
            },
        };
        component
            .attribute("name")
            .is_some_and(|attribute| attribute.set(AttributeValue::String(name.to_string())))
    }

    fn is_local(&self) -> bool {
        self.read_info(|info| info.local).unwrap_or(false)
    }

    fn is_temporary(&self) -> bool {
        self.read_info(|info| info.temporary).unwrap_or(false)
    }

    fn set_temporary(&self, temporary: bool) -> bool {
        self.component_wrapper(ComponentId::FIXED)
            .and_then(|fixed| fixed.attribute("temporary"))
            .is_some_and(|attribute| attribute.set(AttributeValue::Bool(temporary)))
    }

    fn parent_id(&self) -> Option<EntityId> {
        let (shared, entity) = self.live()?;
        let parent = shared.parent_of(entity)?;
        shared.entity_id(parent)
    }

    fn children(&self) -> Vec<EntityRef> {
        let Some((shared, entity)) = self.live() else {
            return Vec::new();
        };
        shared
            .children_of(Some(entity))
            .into_iter()
            .filter_map(|child| shared.wrap(child))
            .map(|child| child as EntityRef)
            .collect()
    }

    fn components(&self) -> Vec<ComponentRef> {
        let Some((shared, entity)) = self.live() else {
            return Vec::new();
        };
        std::iter::once(ComponentId::FIXED)
            .chain(shared.slots(entity).into_iter().map(|slot| slot.id))
            .filter_map(|id| self.component_wrapper(id))
            .map(|component| component as ComponentRef)
            .collect()
    }

    fn create_component(
        &self,
        type_name: &str,
        name: Option<&str>,
        local: bool,
    ) -> Option<ComponentRef> {
        let (shared, entity) = self.live()?;
        let id = shared.attach_component(entity, type_name, name, local)?;
        let component = self.component_wrapper(id)?;
        debug!(entity = %self.id, component = %id, type_name, "Created component");
        self.fire_component_event(EventKind::ComponentCreated, component.clone());
        Some(component as ComponentRef)
    }

    fn component(&self, type_name: &str, name: Option<&str>) -> Option<ComponentRef> {
        let (shared, entity) = self.live()?;
        let type_name = shared.unprefixed(type_name);
        if type_name == FIXED_COMPONENT_NAME && name.map_or(true, str::is_empty) {
            return self
                .component_wrapper(ComponentId::FIXED)
                .map(|component| component as ComponentRef);
        }
        let meta = shared.registry.get_metadata_by_name(type_name)?;
        let slot = shared.slots(entity).into_iter().find(|slot| {
            slot.type_id == meta.type_id && name.map_or(true, |name| slot.name == name)
        })?;
        self.component_wrapper(slot.id)
            .map(|component| component as ComponentRef)
    }

    fn component_by_id(&self, id: ComponentId) -> Option<ComponentRef> {
        self.component_wrapper(id)
            .map(|component| component as ComponentRef)
    }

    fn remove_component(&self, id: ComponentId) -> bool {
        if id == ComponentId::FIXED {
            return false;
        }
        let Some((shared, entity)) = self.live() else {
            return false;
        };
        let Some(component) = self.component_wrapper(id) else {
            return false;
        };

        self.fire_component_event(EventKind::ComponentRemoved, component.clone());
        let removed = shared.detach_component(entity, id);
        self.components.borrow_mut().remove(&id);
        component.expire();
        debug!(entity = %self.id, component = %id, removed, "Removed component");
        removed
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Option<EventToken> {
        if !kind.is_entity_event() || self.expired() {
            return None;
        }
        let callback = self.events.register_callback(kind, handler);
        Some(EventToken::new(EventTarget::Entity(self.id), kind, callback))
    }

    fn unsubscribe(&self, token: &EventToken) -> bool {
        token.target() == EventTarget::Entity(self.id)
            && self.events.unregister_callback(token.kind(), token.callback())
    }
}

impl std::fmt::Debug for NativeEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntity")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute_types::AttributeValue;
    use crate::contracts::{Component, ComponentId, Entity, EventKind, Locality, Scene, SceneEvent};
    use crate::native::NativeScene;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_set_name_creates_name_component() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        assert_eq!(entity.name(), "");

        assert!(entity.set_name("Lamp"));
        assert_eq!(entity.name(), "Lamp");
        assert!(entity.has_component("Name", None));
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Mesh"], Locality::Replicated, None).unwrap();

        let created = Rc::new(Cell::new(0));
        let counter = created.clone();
        entity
            .on_component_created(Box::new(move |_: &SceneEvent| counter.set(counter.get() + 1)))
            .unwrap();

        assert!(entity.create_component("Mesh", None, false).is_none());
        assert_eq!(created.get(), 0);
    }

    #[test]
    fn test_dynamic_components_by_name() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();

        let first = entity
            .create_component("DynamicComponent", Some("stats"), false)
            .unwrap();
        let second = entity
            .create_component("EC_DynamicComponent", Some("extra"), true)
            .unwrap();
        assert!(entity
            .create_component("DynamicComponent", Some("stats"), false)
            .is_none());

        assert_ne!(first.id(), second.id());
        assert_eq!(
            entity
                .component("DynamicComponent", Some("extra"))
                .unwrap()
                .id(),
            second.id()
        );
        assert_eq!(entity.component_by_id(first.id()).unwrap().name(), "stats");
    }

    #[test]
    fn test_fixed_component_cannot_be_removed() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Name"], Locality::Replicated, None).unwrap();
        let fixed = entity.fixed_component().unwrap();

        assert_eq!(fixed.id(), ComponentId::FIXED);
        assert_eq!(fixed.type_name(), "Entity");
        assert!(!entity.remove_component(ComponentId::FIXED));
        assert!(entity.component("Entity", None).is_some());
    }

    #[test]
    fn test_remove_component_fires_before_expiry() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Mesh"], Locality::Replicated, None).unwrap();
        let mesh = entity.component("Mesh", None).unwrap();

        let saw_live = Rc::new(Cell::new(false));
        let flag = saw_live.clone();
        scene
            .subscribe(
                EventKind::ComponentRemoved,
                Box::new(move |event: &SceneEvent| {
                    if let crate::contracts::SceneEvent::ComponentRemoved { component, .. } = event {
                        flag.set(!component.expired());
                    }
                }),
            )
            .unwrap();

        assert!(entity.remove_component(mesh.id()));
        assert!(saw_live.get());
        assert!(mesh.expired());
        assert!(!entity.has_component("Mesh", None));
        assert!(!entity.remove_component(mesh.id()));
    }

    #[test]
    fn test_entity_token_unsubscribe() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();

        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let token = entity
            .on_component_created(Box::new(move |_: &SceneEvent| counter.set(counter.get() + 1)))
            .unwrap();

        entity.create_component("Mesh", None, false).unwrap();
        assert!(scene.unsubscribe(&token));
        assert!(!scene.unsubscribe(&token));
        entity.create_component("Light", None, false).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_temporary_flags() {
        let scene = NativeScene::new();
        let entity = scene.create_entity(&["Name"], Locality::Replicated, None).unwrap();
        assert!(!entity.is_temporary());
        assert!(entity.set_temporary(true));
        assert!(entity.is_temporary());

        let fixed = entity.fixed_component().unwrap();
        assert_eq!(
            fixed.attribute("temporary").unwrap().get(),
            Some(AttributeValue::Bool(true))
        );
    }

    #[test]
    fn test_parent_attribute_reparents() {
        let scene = NativeScene::new();
        let parent = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let child = scene.create_entity(&[], Locality::Replicated, None).unwrap();

        let attribute = child.fixed_component().unwrap().attribute("parent").unwrap();
        assert_eq!(attribute.get(), Some(AttributeValue::String(String::new())));

        assert!(attribute.set_from_string(&parent.id().to_string()).unwrap());
        assert_eq!(child.parent_id(), Some(parent.id()));
        assert_eq!(parent.children().len(), 1);
        assert_eq!(scene.entities().len(), 1);

        // A cycle is refused without changing the hierarchy
        let parent_attribute = parent.fixed_component().unwrap().attribute("parent").unwrap();
        assert!(!parent_attribute.set(AttributeValue::String(child.id().to_string())));
        assert_eq!(parent.parent_id(), None);
    }
}
