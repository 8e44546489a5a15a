//! Translation of document mutation records into canonical scene events

use super::dom::{Element, MutationKind, MutationRecord, ObserverId};
use super::schema::{self, MarkupType, DATA_TAG, ENTITY_TAG, FIXED_COMPONENT, NAME_ATTRIBUTE};
use super::{MarkupEntity, MarkupShared};
use crate::contracts::{dispatch, Entity, EventKind, SceneEvent};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Document observer feeding a markup scene's event registries
pub(crate) struct EventBridge {
    shared: Weak<MarkupShared>,
}

impl EventBridge {
    /// Register a bridge on the scene's document
    pub(crate) fn attach(shared: &Rc<MarkupShared>) -> ObserverId {
        let bridge = EventBridge {
            shared: Rc::downgrade(shared),
        };
        shared
            .document
            .observe(move |record: &MutationRecord| bridge.translate(record))
    }

    fn translate(&self, record: &MutationRecord) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        // Detached subtrees are announced when they are attached
        if !shared.in_scene(&record.target) {
            return;
        }
        trace!(target_uid = record.target.uid(), "Translating mutation record");

        match &record.kind {
            MutationKind::ChildList { added, removed } => {
                for node in removed {
                    if !shared.is_suppressed(node) {
                        node_removed(&shared, &record.target, node);
                    }
                }
                for node in added {
                    if !shared.is_suppressed(node) {
                        node_added(&shared, &record.target, node);
                    }
                }
            }
            MutationKind::Attributes { name, old_value } => {
                if record.target.attribute(name) != *old_value {
                    attribute_changed(&shared, &record.target, name);
                }
            }
            MutationKind::CharacterData { old_value } => {
                if record.target.text() != *old_value {
                    text_changed(&shared, &record.target);
                }
            }
        }
    }
}

/// Entity owning a component element
fn owning_entity(shared: &MarkupShared, component: &Element) -> Option<Rc<MarkupEntity>> {
    let group = component.parent()?;
    shared.wrap(&group)
}

fn node_added(shared: &MarkupShared, parent: &Element, node: &Element) {
    let tag = node.tag();
    if tag == ENTITY_TAG {
        if parent.tag() == ENTITY_TAG || *parent == shared.root() {
            entity_attached(shared, node);
        }
    } else if schema::is_component_tag(tag) && parent.tag() == ENTITY_TAG {
        let Some(entity) = shared.wrap(parent) else {
            return;
        };
        if let Some(component) = entity.component_wrapper(node) {
            entity.fire_component_event(EventKind::ComponentCreated, component);
        }
    } else if MarkupType::from_value_tag(tag).is_some() && parent.tag() == DATA_TAG {
        let Some(component) = owning_entity(shared, parent)
            .and_then(|entity| entity.component_wrapper(parent))
        else {
            return;
        };
        component.attribute_attached(node);
    }
}

fn node_removed(shared: &MarkupShared, parent: &Element, node: &Element) {
    let tag = node.tag();
    if tag == ENTITY_TAG {
        entity_detached(shared, node);
    } else if schema::is_component_tag(tag) && parent.tag() == ENTITY_TAG {
        if let Some(entity) = shared.memoized(parent) {
            entity.component_detached(node);
        }
    } else if MarkupType::from_value_tag(tag).is_some() && parent.tag() == DATA_TAG {
        let Some(component) = parent
            .parent()
            .and_then(|group| shared.memoized(&group))
            .and_then(|entity| entity.component_wrapper(parent))
        else {
            return;
        };
        component.attribute_detached(node);
    }
}

/// Announce a group subtree, parents before children
fn entity_attached(shared: &MarkupShared, group: &Element) {
    let mut stack = vec![group.clone()];
    while let Some(current) = stack.pop() {
        if let Some(entity) = shared.wrap(&current) {
            debug!(entity = %entity.id(), "Entity attached");
            dispatch(
                &shared.events,
                &SceneEvent::EntityCreated {
                    entity: entity.clone(),
                },
            );
            for element in entity.component_elements() {
                if let Some(component) = entity.component_wrapper(&element) {
                    entity.fire_component_event(EventKind::ComponentCreated, component);
                }
            }
        }
        stack.extend(current.children_with_tag(ENTITY_TAG).into_iter().rev());
    }
}

/// Announce the removal of a group subtree, children before parents
fn entity_detached(shared: &MarkupShared, group: &Element) {
    fn post_order(group: &Element, out: &mut Vec<Element>) {
        for child in group.children_with_tag(ENTITY_TAG) {
            post_order(&child, out);
        }
        out.push(group.clone());
    }

    let mut doomed = Vec::new();
    post_order(group, &mut doomed);
    for element in doomed {
        let Some(entity) = shared.memoized(&element) else {
            continue;
        };
        debug!(entity = %entity.id(), "Entity detached");
        dispatch(&shared.events, &SceneEvent::EntityRemoved { entity });
        shared.forget(&element);
    }
}

fn attribute_changed(shared: &MarkupShared, target: &Element, name: &str) {
    if target.tag() == ENTITY_TAG {
        if FIXED_COMPONENT.attribute(name).is_none() {
            return;
        }
        if let Some(fixed) = shared
            .wrap(target)
            .and_then(|entity| entity.fixed_wrapper())
        {
            fixed.notify_changed(name);
        }
        return;
    }

    let is_schema_attribute = schema::static_component(target.tag())
        .is_some_and(|spec| spec.attribute(name).is_some());
    if !is_schema_attribute {
        return;
    }
    if let Some(component) =
        owning_entity(shared, target).and_then(|entity| entity.component_wrapper(target))
    {
        component.notify_changed(name);
    }
}

fn text_changed(shared: &MarkupShared, target: &Element) {
    if MarkupType::from_value_tag(target.tag()).is_none() {
        return;
    }
    let (Some(data), Some(name)) = (target.parent(), target.attribute(NAME_ATTRIBUTE)) else {
        return;
    };
    if data.tag() != DATA_TAG {
        return;
    }
    if let Some(component) =
        owning_entity(shared, &data).and_then(|entity| entity.component_wrapper(&data))
    {
        component.notify_changed(&name);
    }
}
