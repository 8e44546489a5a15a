use super::attribute::{MarkupAttribute, Storage};
use super::dom::Element;
use super::entity::MarkupEntity;
use super::schema::{
    ComponentSpec, MarkupType, DATA_TAG, DATA_TYPE_ID, ENTITY_TAG, FIXED_COMPONENT,
    NAME_ATTRIBUTE, TEMPORARY_ATTRIBUTE,
};
use super::{is_true, MarkupShared};
use crate::codec;
use crate::contracts::{
    dispatch, AttributeRef, Component, ComponentId, EntityId, EventHandler, EventKind,
    EventRegistry, EventTarget, EventToken, SceneEvent,
};
use crate::handle::Handle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub(crate) enum MarkupKind {
    /// Attributes of the `group` element itself
    Fixed,
    /// A component element with a closed attribute set
    Static(&'static ComponentSpec),
    /// A `data` element holding one value element per attribute
    Data,
}

/// Component handle of the markup backend
pub struct MarkupComponent {
    handle: Handle<Element>,
    shared: Weak<MarkupShared>,
    entity: Weak<MarkupEntity>,
    this: Weak<MarkupComponent>,
    entity_id: EntityId,
    id: ComponentId,
    kind: MarkupKind,
    events: EventRegistry,
    attributes: RefCell<HashMap<String, Rc<MarkupAttribute>>>,
}

impl MarkupComponent {
    pub(crate) fn new(
        shared: Weak<MarkupShared>,
        entity: Weak<MarkupEntity>,
        element: Element,
        entity_id: EntityId,
        id: ComponentId,
        kind: MarkupKind,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            handle: Handle::new(element),
            shared,
            entity,
            this: this.clone(),
            entity_id,
            id,
            kind,
            events: EventRegistry::new(),
            attributes: RefCell::new(HashMap::new()),
        })
    }

    fn spec(&self) -> Option<&'static ComponentSpec> {
        match self.kind {
            MarkupKind::Fixed => Some(&FIXED_COMPONENT),
            MarkupKind::Static(spec) => Some(spec),
            MarkupKind::Data => None,
        }
    }

    /// Named value elements of a `data` component, in document order
    fn value_elements(&self) -> Vec<Element> {
        let Some(element) = self.handle.get() else {
            return Vec::new();
        };
        element
            .children()
            .into_iter()
            .filter(|child| {
                MarkupType::from_value_tag(child.tag()).is_some()
                    && child.has_attribute(NAME_ATTRIBUTE)
            })
            .collect()
    }

    fn value_element(&self, name: &str) -> Option<Element> {
        self.value_elements()
            .into_iter()
            .find(|element| element.attribute(NAME_ATTRIBUTE).as_deref() == Some(name))
    }

    /// Attribute names in index order
    pub(crate) fn layout(&self) -> Vec<String> {
        if self.handle.expired() {
            return Vec::new();
        }
        match self.spec() {
            Some(spec) => spec.attributes.iter().map(|a| a.name.to_string()).collect(),
            None => self
                .value_elements()
                .iter()
                .filter_map(|element| element.attribute(NAME_ATTRIBUTE))
                .collect(),
        }
    }

    /// Memoized wrapper for an attribute of this component
    pub(crate) fn attribute_wrapper(&self, name: &str) -> Option<Rc<MarkupAttribute>> {
        if let Some(attribute) = self.attributes.borrow().get(name) {
            return Some(attribute.clone());
        }
        let element = self.handle.get()?;
        let attribute = match self.spec() {
            Some(spec) => {
                let spec = spec.attribute(name)?;
                MarkupAttribute::new(
                    element,
                    self.this.clone(),
                    name.to_string(),
                    spec.markup_type,
                    Storage::ElementAttribute(spec),
                )
            }
            None => {
                let value = self.value_element(name)?;
                let markup_type = MarkupType::from_value_tag(value.tag())?;
                MarkupAttribute::new(
                    value,
                    self.this.clone(),
                    name.to_string(),
                    markup_type,
                    Storage::Text,
                )
            }
        };
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), attribute.clone());
        Some(attribute)
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

    /// Announce a value element added to this `data` component
    pub(crate) fn attribute_attached(&self, element: &Element) {
        let (Some(component), Some(name)) =
            (self.this.upgrade(), element.attribute(NAME_ATTRIBUTE))
        else {
            return;
        };
        let Some(attribute) = self.attribute_wrapper(&name) else {
            return;
        };
        dispatch(
            &self.events,
            &SceneEvent::AttributeAdded {
                component,
                attribute,
            },
        );
    }

    /// Announce and expire the attribute of a removed value element
    pub(crate) fn attribute_detached(&self, element: &Element) {
        let (Some(component), Some(name)) =
            (self.this.upgrade(), element.attribute(NAME_ATTRIBUTE))
        else {
            return;
        };
        let Some(markup_type) = MarkupType::from_value_tag(element.tag()) else {
            return;
        };
        let memoized = self
            .attributes
            .borrow()
            .get(&name)
            .filter(|attribute| attribute.element().as_ref() == Some(element))
            .cloned();
        let attribute = memoized.unwrap_or_else(|| {
            MarkupAttribute::new(
                element.clone(),
                self.this.clone(),
                name.clone(),
                markup_type,
                Storage::Text,
            )
        });

        dispatch(
            &self.events,
            &SceneEvent::AttributeAboutToBeRemoved {
                component,
                attribute: attribute.clone(),
            },
        );
        let is_memoized = self
            .attributes
            .borrow()
            .get(&name)
            .is_some_and(|memoized| Rc::ptr_eq(memoized, &attribute));
        if is_memoized {
            self.attributes.borrow_mut().remove(&name);
        }
        attribute.expire();
        debug!(component = %self.id, attribute = %name, "Attribute detached");
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

impl Component for MarkupComponent {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn name(&self) -> String {
        match self.kind {
            MarkupKind::Fixed => String::new(),
            _ => self
                .handle
                .get()
                .and_then(|element| element.attribute(NAME_ATTRIBUTE))
                .unwrap_or_default(),
        }
    }

    fn type_name(&self) -> String {
        match self.kind {
            MarkupKind::Fixed => ENTITY_TAG,
            MarkupKind::Static(spec) => spec.tag,
            MarkupKind::Data => DATA_TAG,
        }
        .to_string()
    }

    fn type_id(&self) -> u32 {
        match self.kind {
            MarkupKind::Fixed => FIXED_COMPONENT.type_id,
            MarkupKind::Static(spec) => spec.type_id,
            MarkupKind::Data => DATA_TYPE_ID,
        }
    }

    fn parent_id(&self) -> EntityId {
        self.entity_id
    }

    fn is_fixed(&self) -> bool {
        matches!(self.kind, MarkupKind::Fixed)
    }

    fn is_dynamic(&self) -> bool {
        matches!(self.kind, MarkupKind::Data)
    }

    fn is_temporary(&self) -> bool {
        self.handle
            .get()
            .is_some_and(|element| is_true(&element, TEMPORARY_ATTRIBUTE))
    }

    fn set_temporary(&self, temporary: bool) -> bool {
        let Some(element) = self.handle.get() else {
            return false;
        };
        if is_true(&element, TEMPORARY_ATTRIBUTE) != temporary {
            element.set_attribute(TEMPORARY_ATTRIBUTE, codec::format_bool(temporary));
        }
        true
    }

    fn attributes(&self) -> Vec<AttributeRef> {
        self.layout()
            .iter()
            .filter_map(|name| self.attribute_wrapper(name))
            .map(|attribute| attribute as AttributeRef)
            .collect()
    }

    fn create_attribute(&self, type_id: u32, name: &str) -> Option<AttributeRef> {
        if !self.is_dynamic() || name.is_empty() {
            return None;
        }
        let shared = self.shared.upgrade()?;
        let data = self.handle.get()?;
        let markup_type = MarkupType::from_id(type_id)?;
        let Some(tag) = markup_type.value_tag() else {
            debug!(type_id, "No value element for attribute type");
            return None;
        };
        if self.value_element(name).is_some() {
            return None;
        }

        let element = shared.document.create_element(tag);
        element.set_attribute(NAME_ATTRIBUTE, name);
        element.set_text(markup_type.default_text());
        // Attaching makes the bridge announce the attribute
        if let Err(err) = data.append_child(&element) {
            warn!(component = %self.id, attribute = name, error = %err, "Failed to attach attribute");
            return None;
        }
        debug!(component = %self.id, attribute = name, tag, "Created attribute");
        self.attribute_wrapper(name)
            .map(|attribute| attribute as AttributeRef)
    }

    fn remove_attribute(&self, name: &str) -> bool {
        if !self.is_dynamic() {
            return false;
        }
        let (Some(data), Some(element)) = (self.handle.get(), self.value_element(name)) else {
            return false;
        };
        // The bridge announces the removal and expires the handle
        data.remove_child(&element).is_ok()
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

impl std::fmt::Debug for MarkupComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupComponent")
            .field("entity", &self.entity_id)
            .field("id", &self.id)
            .field("type_name", &self.type_name())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute_types::AttributeValue;
    use crate::contracts::{Component, Entity, EventKind, Locality, Scene, SceneEvent};
    use crate::markup::schema::MarkupType;
    use crate::markup::MarkupScene;
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
    fn test_static_attributes_follow_schema() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["light"], Locality::Replicated, None).unwrap();
        let light = entity.component("light", None).unwrap();

        let names: Vec<_> = light.attributes().iter().map(|a| a.name()).collect();
        assert_eq!(names, ["model", "color", "intensity", "castshadow"]);
        assert_eq!(light.attribute("intensity").unwrap().index(), Some(2));
        assert!(light.create_attribute(MarkupType::Number.id(), "extra").is_none());
        assert!(!light.remove_attribute("color"));
    }

    #[test]
    fn test_set_fires_change_once() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["light"], Locality::Replicated, None).unwrap();
        let light = entity.component("light", None).unwrap();
        let log = log_events(light.as_ref());

        let intensity = light.attribute("intensity").unwrap();
        assert!(intensity.set(AttributeValue::Real(3.0)));
        assert!(intensity.set(AttributeValue::Real(3.0)));
        assert_eq!(
            *log.borrow(),
            vec![(EventKind::AttributeChanged, "intensity".to_string())]
        );
    }

    #[test]
    fn test_data_attribute_lifecycle() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let data = entity.create_component("data", Some("stats"), false).unwrap();
        let log = log_events(data.as_ref());

        let speed = data.create_attribute(MarkupType::Number.id(), "speed").unwrap();
        assert!(data.create_attribute(MarkupType::Number.id(), "speed").is_none());
        assert!(data.create_attribute(MarkupType::Enumeration.id(), "mode").is_none());
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
    fn test_value_element_edits_are_observed() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["data"], Locality::Replicated, None).unwrap();
        let data = entity.component("data", None).unwrap();
        let tags = data.create_attribute(MarkupType::TextList.id(), "tags").unwrap();
        let log = log_events(data.as_ref());

        let value = scene.document().root().children()[0].children()[0].children()[0].clone();
        assert_eq!(value.tag(), "strings");
        value.set_text("red\ngreen");

        assert_eq!(
            tags.get(),
            Some(AttributeValue::Array(vec!["red".into(), "green".into()]))
        );
        assert_eq!(
            *log.borrow(),
            vec![(EventKind::AttributeChanged, "tags".to_string())]
        );
    }

    #[test]
    fn test_component_temporary_flag() {
        let scene = MarkupScene::new();
        let entity = scene.create_entity(&["mesh"], Locality::Replicated, None).unwrap();
        let mesh = entity.component("mesh", None).unwrap();

        assert!(mesh.set_temporary(true));
        assert!(mesh.is_temporary());
        assert!(!entity.is_temporary());
    }
}
