use super::component::{MarkupComponent, MarkupKind};
use super::dom::{Element, NodeId};
use super::schema::{
    self, ENTITY_TAG, LOCAL_ATTRIBUTE, NAME_ATTRIBUTE, TEMPORARY_ATTRIBUTE,
};
use super::{is_true, MarkupShared};
use crate::attribute_types::AttributeValue;
use crate::codec;
use crate::contracts::{
    dispatch, Component, ComponentId, ComponentRef, Entity, EntityId, EntityRef, EventHandler,
    EventKind, EventRegistry, EventTarget, EventToken, SceneEvent,
};
use crate::handle::{Handle, IdentityTable};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Entity handle of the markup backend, wrapping a `group` element
pub struct MarkupEntity {
    handle: Handle<Element>,
    shared: Weak<MarkupShared>,
    this: Weak<MarkupEntity>,
    id: EntityId,
    events: EventRegistry,
    /// Component ids by element; 0 is reserved for the fixed component
    component_ids: RefCell<IdentityTable<NodeId>>,
    components: RefCell<HashMap<ComponentId, Rc<MarkupComponent>>>,
}

impl MarkupEntity {
    pub(crate) fn new(shared: Weak<MarkupShared>, element: Element, id: EntityId) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            handle: Handle::new(element),
            shared,
            this: this.clone(),
            id,
            events: EventRegistry::new(),
            component_ids: RefCell::new(IdentityTable::new(1)),
            components: RefCell::new(HashMap::new()),
        })
    }

    /// The `group` element, `None` once expired
    pub fn element(&self) -> Option<Element> {
        self.handle.get()
    }

    fn live(&self) -> Option<(Rc<MarkupShared>, Element)> {
        let element = self.handle.get()?;
        let shared = self.shared.upgrade()?;
        Some((shared, element))
    }

    /// Component elements in document order
    pub(crate) fn component_elements(&self) -> Vec<Element> {
        self.handle
            .get()
            .map(|group| {
                group
                    .children()
                    .into_iter()
                    .filter(|child| schema::is_component_tag(child.tag()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_component(&self, tag: &str, name: Option<&str>) -> Option<Element> {
        let group = self.handle.get()?;
        let found = group.children_with_tag(tag).into_iter().find(|element| {
            name.map_or(true, |name| {
                element.attribute(NAME_ATTRIBUTE).unwrap_or_default() == name
            })
        });
        found
    }

    fn component_element(&self, id: ComponentId) -> Option<Element> {
        let uid = self.component_ids.borrow().node(id.0)?;
        self.component_elements()
            .into_iter()
            .find(|element| element.uid() == uid)
    }

    pub(crate) fn memoized_component(&self, id: ComponentId) -> Option<Rc<MarkupComponent>> {
        self.components.borrow().get(&id).cloned()
    }

    /// The component exposing the group's own attributes
    pub(crate) fn fixed_wrapper(&self) -> Option<Rc<MarkupComponent>> {
        if let Some(component) = self.memoized_component(ComponentId::FIXED) {
            return Some(component);
        }
        let group = self.handle.get()?;
        let component = MarkupComponent::new(
            self.shared.clone(),
            self.this.clone(),
            group,
            self.id,
            ComponentId::FIXED,
            MarkupKind::Fixed,
        );
        self.components
            .borrow_mut()
            .insert(ComponentId::FIXED, component.clone());
        Some(component)
    }

    /// Memoized wrapper for a component element of this group
    pub(crate) fn component_wrapper(&self, element: &Element) -> Option<Rc<MarkupComponent>> {
        if self.handle.expired() {
            return None;
        }
        let kind = match element.tag() {
            schema::DATA_TAG => MarkupKind::Data,
            tag => MarkupKind::Static(schema::static_component(tag)?),
        };
        let id = ComponentId(self.component_ids.borrow_mut().id_for(element.uid()));
        if let Some(component) = self.memoized_component(id) {
            return Some(component);
        }
        let component = MarkupComponent::new(
            self.shared.clone(),
            self.this.clone(),
            element.clone(),
            self.id,
            id,
            kind,
        );
        self.components.borrow_mut().insert(id, component.clone());
        Some(component)
    }

    /// Deliver a component event on this entity, then at scene level
    pub(crate) fn fire_component_event(&self, kind: EventKind, component: Rc<MarkupComponent>) {
        let Some(entity) = self.this.upgrade() else {
            return;
        };
        let event = match kind {
            EventKind::ComponentCreated => SceneEvent::ComponentCreated { entity, component },
            EventKind::ComponentRemoved => SceneEvent::ComponentRemoved { entity, component },
            _ => return,
        };
        dispatch(&self.events, &event);
        if let Some(shared) = self.shared.upgrade() {
            dispatch(&shared.events, &event);
        }
    }

    /// Announce and expire a component whose element left the group
    pub(crate) fn component_detached(&self, element: &Element) {
        let Some(component) = self.component_wrapper(element) else {
            return;
        };
        self.fire_component_event(EventKind::ComponentRemoved, component.clone());
        let released = self.component_ids.borrow_mut().release(element.uid());
        if let Some(id) = released {
            self.components.borrow_mut().remove(&ComponentId(id));
        }
        component.expire();
        debug!(entity = %self.id, component = %component.id(), "Component detached");
    }

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

impl Entity for MarkupEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn name(&self) -> String {
        self.handle
            .get()
            .and_then(|group| group.attribute(NAME_ATTRIBUTE))
            .unwrap_or_default()
    }

    fn set_name(&self, name: &str) -> bool {
        self.fixed_wrapper()
            .and_then(|fixed| fixed.attribute(NAME_ATTRIBUTE))
            .is_some_and(|attribute| attribute.set(AttributeValue::String(name.to_string())))
    }

    fn is_local(&self) -> bool {
        self.handle
            .get()
            .is_some_and(|group| is_true(&group, LOCAL_ATTRIBUTE))
    }

    fn is_temporary(&self) -> bool {
        self.handle
            .get()
            .is_some_and(|group| is_true(&group, TEMPORARY_ATTRIBUTE))
    }

    fn set_temporary(&self, temporary: bool) -> bool {
        let Some(group) = self.handle.get() else {
            return false;
        };
        if is_true(&group, TEMPORARY_ATTRIBUTE) != temporary {
            group.set_attribute(TEMPORARY_ATTRIBUTE, codec::format_bool(temporary));
        }
        true
    }

    fn parent_id(&self) -> Option<EntityId> {
        let (shared, group) = self.live()?;
        let parent = group.parent()?;
        if parent.tag() != ENTITY_TAG {
            return None;
        }
        shared.entity_id(&parent)
    }

    fn children(&self) -> Vec<EntityRef> {
        let Some((shared, group)) = self.live() else {
            return Vec::new();
        };
        group
            .children_with_tag(ENTITY_TAG)
            .iter()
            .filter_map(|child| shared.wrap(child))
            .map(|child| child as EntityRef)
            .collect()
    }

    fn components(&self) -> Vec<ComponentRef> {
        let Some(fixed) = self.fixed_wrapper() else {
            return Vec::new();
        };
        std::iter::once(fixed)
            .chain(
                self.component_elements()
                    .iter()
                    .filter_map(|element| self.component_wrapper(element)),
            )
            .map(|component| component as ComponentRef)
            .collect()
    }

    fn create_component(
        &self,
        type_name: &str,
        name: Option<&str>,
        local: bool,
    ) -> Option<ComponentRef> {
        let (shared, group) = self.live()?;
        let tag = shared.unprefixed(type_name);
        if !schema::is_component_tag(tag) {
            debug!(type_name, "Unknown component type");
            return None;
        }
        let name = name.unwrap_or_default();
        if self.find_component(tag, Some(name)).is_some() {
            debug!(type_name = tag, name, "Component name already in use");
            return None;
        }

        let element = shared.document.create_element(tag);
        if !name.is_empty() {
            element.set_attribute(NAME_ATTRIBUTE, name);
        }
        if local {
            element.set_attribute(LOCAL_ATTRIBUTE, "true");
        }
        // Attaching makes the bridge announce the component
        if let Err(err) = group.append_child(&element) {
            warn!(entity = %self.id, type_name = tag, error = %err, "Failed to attach component");
            return None;
        }
        let component = self.component_wrapper(&element)?;
        debug!(entity = %self.id, component = %component.id(), type_name = tag, "Created component");
        Some(component)
    }

    fn component(&self, type_name: &str, name: Option<&str>) -> Option<ComponentRef> {
        let shared = self.shared.upgrade()?;
        let tag = shared.unprefixed(type_name);
        if tag == ENTITY_TAG && name.map_or(true, str::is_empty) {
            return self
                .fixed_wrapper()
                .map(|component| component as ComponentRef);
        }
        if !schema::is_component_tag(tag) {
            return None;
        }
        let element = self.find_component(tag, name)?;
        self.component_wrapper(&element)
            .map(|component| component as ComponentRef)
    }

    fn component_by_id(&self, id: ComponentId) -> Option<ComponentRef> {
        let component = if id == ComponentId::FIXED {
            self.fixed_wrapper()
        } else {
            let element = self.component_element(id)?;
            self.component_wrapper(&element)
        };
        component.map(|component| component as ComponentRef)
    }

    fn remove_component(&self, id: ComponentId) -> bool {
        if id == ComponentId::FIXED {
            return false;
        }
        let (Some(group), Some(element)) = (self.handle.get(), self.component_element(id)) else {
            return false;
        };
        // The bridge announces the removal and expires the handles
        match group.remove_child(&element) {
            Ok(()) => true,
            Err(err) => {
                warn!(entity = %self.id, component = %id, error = %err, "Failed to remove component");
                false
            }
        }
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

impl std::fmt::Debug for MarkupEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupEntity")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute_types::AttributeValue;
    use crate::contracts::{Component, ComponentId, Entity, EventKind, Locality, Scene, SceneEvent};
    use crate::markup::MarkupScene;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_name_lives_on_the_group() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        assert_eq!(entity.name(), "");

        assert!(entity.set_name("Lamp"));
        assert_eq!(entity.name(), "Lamp");
        let group = scene.document().root().children()[0].clone();
        assert_eq!(group.attribute("name").as_deref(), Some("Lamp"));
    }

    #[test]
    fn test_components_by_tag_and_name() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["mesh"], Locality::Replicated, None).unwrap();

        assert!(entity.create_component("mesh", None, false).is_none());
        let named = entity.create_component("xml3d:mesh", Some("lod1"), false).unwrap();
        let data = entity.create_component("data", Some("stats"), true).unwrap();
        assert!(entity.create_component("data", Some("stats"), false).is_none());
        assert!(entity.create_component("hologram", None, false).is_none());

        assert_eq!(named.name(), "lod1");
        assert_eq!(entity.component("mesh", Some("lod1")).unwrap().id(), named.id());
        assert_eq!(entity.component_by_id(data.id()).unwrap().name(), "stats");
        assert!(data.is_dynamic());
        assert_eq!(entity.num_components(), 4);
    }

    #[test]
    fn test_fixed_component() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let fixed = entity.fixed_component().unwrap();

        assert_eq!(fixed.id(), ComponentId::FIXED);
        assert_eq!(fixed.type_name(), "group");
        assert!(!entity.remove_component(ComponentId::FIXED));
        let names: Vec<_> = fixed.attributes().iter().map(|a| a.name()).collect();
        assert_eq!(names, ["name", "visible", "transform"]);
        assert_eq!(
            fixed.attribute("visible").unwrap().get(),
            Some(AttributeValue::Bool(true))
        );
    }

    #[test]
    fn test_remove_component_announced_while_live() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["light"], Locality::Replicated, None).unwrap();
        let light = entity.component("light", None).unwrap();

        let saw_live = Rc::new(Cell::new(false));
        let flag = saw_live.clone();
        entity
            .on_component_removed(Box::new(move |event: &SceneEvent| {
                if let SceneEvent::ComponentRemoved { component, .. } = event {
                    flag.set(!component.expired());
                }
            }))
            .unwrap();

        assert!(entity.remove_component(light.id()));
        assert!(saw_live.get());
        assert!(light.expired());
        assert!(!entity.has_component("light", None));
        assert!(!entity.remove_component(light.id()));
    }

    #[test]
    fn test_component_events_reach_entity_and_scene() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        entity
            .on_component_created(Box::new(move |_: &SceneEvent| sink.borrow_mut().push("entity")))
            .unwrap();
        let sink = log.clone();
        scene
            .on_component_created(Box::new(move |_: &SceneEvent| sink.borrow_mut().push("scene")))
            .unwrap();

        entity.create_component("material", None, false).unwrap();
        assert_eq!(*log.borrow(), ["entity", "scene"]);
    }

    #[test]
    fn test_local_and_temporary_flags() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["mesh"], Locality::Local, None).unwrap();
        assert!(entity.is_local());
        assert_eq!(entity.id().0, scene.config().local_id_base);

        assert!(!entity.is_temporary());
        assert!(entity.set_temporary(true));
        assert!(entity.is_temporary());
        assert!(entity.fixed_component().unwrap().is_temporary());
        // Not an attribute of the group
        assert!(entity.fixed_component().unwrap().attribute("temporary").is_none());
    }

    #[test]
    fn test_children_in_document_order() {
        let scene = MarkupScene::new();
        let parent = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let first = scene
            .create_entity(&[], Locality::Replicated, Some(parent.id()))
            .unwrap();
        let second = scene
            .create_entity(&[], Locality::Replicated, Some(parent.id()))
            .unwrap();

        let ids: Vec<_> = parent.children().iter().map(|c| c.id()).collect();
        assert_eq!(ids, [first.id(), second.id()]);
        assert_eq!(second.parent_id(), Some(parent.id()));
        assert_eq!(parent.parent_id(), None);
    }

    #[test]
    fn test_entity_subscriptions_are_scoped() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        assert!(entity
            .subscribe(EventKind::EntityCreated, Box::new(|_| {}))
            .is_none());

        let token = entity.on_component_created(Box::new(|_| {})).unwrap();
        assert!(scene.unsubscribe(&token));
        assert!(!entity.unsubscribe(&token));
    }
}
