//! Component inspector
//!
//! Builds one section per component of the inspected entity and one row per
//! attribute. Each row carries an editor chosen by classifying the
//! attribute's type id, so the inspector works for attribute shapes it has
//! never seen. The inspector listens to scene events for its entity and keeps
//! its rows current; dropping it releases every subscription.

use crate::array_rows::ArrayRows;
use crate::settings::InspectorSettings;
use scene::prelude::*;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Index of the first scale field in a flattened transform
const SCALE_FIELDS_START: usize = 6;

/// Editing control for one attribute
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEditor {
    /// Single text input holding the attribute's string form
    Text(String),
    /// Choice list of an enumeration
    Choice {
        choices: Vec<EnumValue>,
        selected: Option<usize>,
    },
    /// One numeric input per tuple component
    Tuple {
        labels: &'static [&'static str],
        values: Vec<f64>,
    },
    /// Position, rotation and scale inputs
    Transform { values: [f32; 9] },
    /// One row per item plus a trailing row for appending
    Array(ArrayRows),
}

impl FieldEditor {
    fn read(class: AttributeClass, attribute: &dyn Attribute) -> Self {
        let value = attribute.get();
        match class {
            AttributeClass::Atomic => {
                FieldEditor::Text(attribute.to_display_string().unwrap_or_default())
            }
            AttributeClass::Enum => {
                let choices = attribute.valid_values().unwrap_or_default();
                let selected = choices
                    .iter()
                    .position(|choice| Some(&choice.value) == value.as_ref());
                FieldEditor::Choice { choices, selected }
            }
            AttributeClass::Tuple { arity, .. } => FieldEditor::Tuple {
                labels: class.field_labels(),
                values: value
                    .as_ref()
                    .and_then(AttributeValue::as_tuple)
                    .map(<[f64]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; arity]),
            },
            AttributeClass::Transform => FieldEditor::Transform {
                values: value
                    .as_ref()
                    .and_then(AttributeValue::as_transform)
                    .unwrap_or_default()
                    .fields(),
            },
            AttributeClass::Array => FieldEditor::Array(ArrayRows::new(
                value.as_ref().and_then(AttributeValue::as_array).unwrap_or(&[]),
            )),
        }
    }
}

/// One attribute of a component section
#[derive(Clone)]
pub struct AttributeRow {
    attribute: AttributeRef,
    pub name: String,
    pub class: AttributeClass,
    pub editor: FieldEditor,
}

impl AttributeRow {
    fn new(attribute: AttributeRef, class: AttributeClass) -> Self {
        Self {
            name: attribute.name(),
            editor: FieldEditor::read(class, attribute.as_ref()),
            attribute,
            class,
        }
    }

    /// Re-read the value; array rows are reconciled in place
    fn refresh(&mut self) {
        match (&mut self.editor, self.class) {
            (FieldEditor::Array(rows), AttributeClass::Array) => {
                let value = self.attribute.get();
                rows.reconcile(value.as_ref().and_then(AttributeValue::as_array).unwrap_or(&[]));
            }
            _ => self.editor = FieldEditor::read(self.class, self.attribute.as_ref()),
        }
    }

    pub fn attribute(&self) -> &AttributeRef {
        &self.attribute
    }
}

/// Rows of one component
pub struct ComponentSection {
    component: ComponentRef,
    pub id: ComponentId,
    pub title: String,
    pub fixed: bool,
    pub dynamic: bool,
    pub rows: Vec<AttributeRow>,
    tokens: Vec<EventToken>,
}

impl ComponentSection {
    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub fn row(&self, name: &str) -> Option<&AttributeRow> {
        self.rows.iter().find(|row| row.name == name)
    }

    fn release(&mut self) {
        for token in self.tokens.drain(..) {
            self.component.unsubscribe(&token);
        }
    }
}

/// State shared with the event handlers
#[derive(Default)]
struct InspectorState {
    sections: RefCell<Vec<ComponentSection>>,
    rebuild: Cell<bool>,
    stale: Cell<bool>,
}

impl InspectorState {
    fn attribute_changed(&self, component: ComponentId, name: &str) {
        let Ok(mut sections) = self.sections.try_borrow_mut() else {
            self.rebuild.set(true);
            return;
        };
        if let Some(row) = sections
            .iter_mut()
            .filter(|section| section.id == component)
            .flat_map(|section| section.rows.iter_mut())
            .find(|row| row.name == name)
        {
            trace!(component = %component, attribute = name, "Refreshing inspector row");
            row.refresh();
        }
    }

    fn clear(&self) {
        if let Ok(mut sections) = self.sections.try_borrow_mut() {
            for section in sections.iter_mut() {
                section.release();
            }
            sections.clear();
        }
    }
}

/// Attribute editor for a single entity
pub struct Inspector {
    scene: SceneRef,
    entity: EntityRef,
    settings: InspectorSettings,
    state: Rc<InspectorState>,
    tokens: Vec<EventToken>,
}

impl Inspector {
    /// Inspect `id`; `None` if the scene has no such entity
    pub fn open(scene: SceneRef, id: EntityId, settings: InspectorSettings) -> Option<Self> {
        let entity = scene.entity_by_id(id)?;
        let state = Rc::new(InspectorState::default());
        let tokens = subscribe(scene.as_ref(), id, &state);

        let inspector = Self {
            scene,
            entity,
            settings,
            state,
            tokens,
        };
        inspector.rebuild();
        debug!(entity = %id, "Opened inspector");
        Some(inspector)
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Whether the inspected entity has been removed
    pub fn is_stale(&self) -> bool {
        self.state.stale.get() || self.entity.expired()
    }

    /// Current sections, rebuilt first if components were added or removed
    pub fn sections(&self) -> Ref<'_, Vec<ComponentSection>> {
        self.refresh();
        self.state.sections.borrow()
    }

    /// Editor of one attribute row
    pub fn editor(&self, component: ComponentId, attribute: &str) -> Option<FieldEditor> {
        self.row(component, attribute).map(|row| row.editor)
    }

    /// Apply pending structure changes
    pub fn refresh(&self) {
        if self.is_stale() {
            if !self.state.stale.replace(true) {
                debug!(entity = %self.entity.id(), "Inspected entity is gone, clearing");
            }
            self.state.clear();
            return;
        }
        if self.state.rebuild.replace(false) {
            self.rebuild();
        }
    }

    fn rebuild(&self) {
        let mut sections = Vec::new();
        for component in self.entity.components() {
            if component.is_fixed() && !self.settings.show_fixed_component {
                continue;
            }
            sections.push(self.build_section(component));
        }

        let Ok(mut current) = self.state.sections.try_borrow_mut() else {
            self.state.rebuild.set(true);
            return;
        };
        for section in current.iter_mut() {
            section.release();
        }
        trace!(entity = %self.entity.id(), sections = sections.len(), "Rebuilt inspector");
        *current = sections;
    }

    fn build_section(&self, component: ComponentRef) -> ComponentSection {
        let type_name = component.type_name();
        let mut title = if self.settings.human_readable_names {
            self.scene.component_name_human_readable(&type_name)
        } else {
            type_name.clone()
        };
        let name = component.name();
        if !name.is_empty() {
            title = format!("{title} ({name})");
        }

        let mut rows = Vec::new();
        for attribute in component.attributes() {
            match classify(self.scene.as_ref(), attribute.type_id()) {
                Ok(class) => rows.push(AttributeRow::new(attribute, class)),
                Err(err) => {
                    // Skip the row, keep the rest of the panel
                    self.scene
                        .log_warning(&format!("{type_name}.{}: {err}", attribute.name()));
                }
            }
        }

        let mut tokens = Vec::new();
        if component.is_dynamic() {
            for kind in [EventKind::AttributeAdded, EventKind::AttributeAboutToBeRemoved] {
                let state = Rc::downgrade(&self.state);
                let handler: EventHandler = Box::new(move |_: &SceneEvent| {
                    if let Some(state) = state.upgrade() {
                        state.rebuild.set(true);
                    }
                });
                tokens.extend(component.subscribe(kind, handler));
            }
        }

        ComponentSection {
            id: component.id(),
            title,
            fixed: component.is_fixed(),
            dynamic: component.is_dynamic(),
            component,
            rows,
            tokens,
        }
    }

    fn row(&self, component: ComponentId, attribute: &str) -> Option<AttributeRow> {
        self.sections()
            .iter()
            .find(|section| section.id == component)
            .and_then(|section| section.row(attribute))
            .cloned()
    }

    fn commit(&self, component: ComponentId, row: &AttributeRow, value: AttributeValue) -> bool {
        let accepted = row.attribute.set(value);
        if !accepted {
            debug!(component = %component, attribute = %row.name, "Backend rejected value");
        }
        // Some writes leave the value unchanged and fire nothing
        self.state.attribute_changed(component, &row.name);
        accepted
    }

    /// Set an atomic attribute from text
    pub fn set_text(&self, component: ComponentId, attribute: &str, text: &str) -> bool {
        let Some(row) = self.row(component, attribute) else {
            return false;
        };
        if row.class != AttributeClass::Atomic {
            return false;
        }
        let result = row.attribute.set_from_string(text);
        self.state.attribute_changed(component, attribute);
        match result {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(attribute, text, error = %err, "Invalid attribute text");
                false
            }
        }
    }

    /// Choose entry `index` of an enumeration
    pub fn select_choice(&self, component: ComponentId, attribute: &str, index: usize) -> bool {
        let Some(row) = self.row(component, attribute) else {
            return false;
        };
        let FieldEditor::Choice { choices, .. } = &row.editor else {
            return false;
        };
        let Some(choice) = choices.get(index) else {
            return false;
        };
        self.commit(component, &row, choice.value.clone())
    }

    /// Set one component of a tuple
    pub fn set_tuple_field(
        &self,
        component: ComponentId,
        attribute: &str,
        index: usize,
        value: f64,
    ) -> bool {
        let Some(row) = self.row(component, attribute) else {
            return false;
        };
        let FieldEditor::Tuple { values, .. } = &row.editor else {
            return false;
        };
        let mut values = values.clone();
        let Some(slot) = values.get_mut(index) else {
            return false;
        };
        *slot = value;
        self.commit(component, &row, AttributeValue::Tuple(values))
    }

    /// Set one of the nine transform fields; scale never goes below zero
    pub fn set_transform_field(
        &self,
        component: ComponentId,
        attribute: &str,
        index: usize,
        value: f32,
    ) -> bool {
        let Some(row) = self.row(component, attribute) else {
            return false;
        };
        let FieldEditor::Transform { values } = &row.editor else {
            return false;
        };
        if index >= TransformValue::FIELD_COUNT {
            return false;
        }
        let value = if index >= SCALE_FIELDS_START {
            value.max(0.0)
        } else {
            value
        };
        let transform = TransformValue::from_fields(*values).with_field(index, value);
        self.commit(component, &row, AttributeValue::Transform(transform))
    }

    /// Edit row `index` of an array; the trailing row appends
    pub fn set_array_row(
        &self,
        component: ComponentId,
        attribute: &str,
        index: usize,
        text: &str,
    ) -> bool {
        let Some(row) = self.row(component, attribute) else {
            return false;
        };
        let FieldEditor::Array(rows) = &row.editor else {
            return false;
        };
        match rows.edited(index, text) {
            Some(items) => self.commit(component, &row, AttributeValue::Array(items)),
            None => true,
        }
    }

    /// Rename the inspected entity
    pub fn rename(&self, name: &str) -> bool {
        self.entity.set_name(name)
    }

    /// Add a component; name collisions are reported on the scene's log channel
    pub fn add_component(&self, type_name: &str, name: Option<&str>) -> Option<ComponentId> {
        match self.entity.create_component(type_name, name, false) {
            Some(component) => {
                self.state.rebuild.set(true);
                Some(component.id())
            }
            None => {
                self.scene.log_warning(&format!(
                    "Could not add {type_name} named {:?} to entity {}",
                    name.unwrap_or_default(),
                    self.entity.id()
                ));
                None
            }
        }
    }

    pub fn remove_component(&self, id: ComponentId) -> bool {
        let removed = self.entity.remove_component(id);
        if removed {
            self.state.rebuild.set(true);
        }
        removed
    }

    /// Add a runtime attribute to a dynamic component
    pub fn add_attribute(&self, component: ComponentId, type_id: u32, name: &str) -> bool {
        let Some(target) = self.entity.component_by_id(component) else {
            return false;
        };
        let created = target.create_attribute(type_id, name).is_some();
        if created {
            self.state.rebuild.set(true);
        } else {
            self.scene.log_warning(&format!(
                "Could not add attribute {name:?} to {}",
                target.type_name()
            ));
        }
        created
    }

    pub fn remove_attribute(&self, component: ComponentId, name: &str) -> bool {
        let removed = self
            .entity
            .component_by_id(component)
            .is_some_and(|target| target.remove_attribute(name));
        if removed {
            self.state.rebuild.set(true);
        }
        removed
    }
}

/// Scene-level subscriptions filtered to `entity`
fn subscribe(scene: &dyn Scene, entity: EntityId, state: &Rc<InspectorState>) -> Vec<EventToken> {
    let handler = |state: Weak<InspectorState>| -> EventHandler {
        Box::new(move |event: &SceneEvent| {
            let Some(state) = state.upgrade() else {
                return;
            };
            if event.entity_id() != Some(entity) {
                return;
            }
            match event {
                SceneEvent::AttributeChanged {
                    component,
                    attribute,
                    ..
                } => state.attribute_changed(component.id(), &attribute.name()),
                SceneEvent::ComponentCreated { .. } | SceneEvent::ComponentRemoved { .. } => {
                    state.rebuild.set(true)
                }
                SceneEvent::EntityRemoved { .. } => {
                    state.stale.set(true);
                    state.clear();
                }
                _ => {}
            }
        })
    };

    [
        EventKind::AttributeChanged,
        EventKind::ComponentCreated,
        EventKind::ComponentRemoved,
        EventKind::EntityRemoved,
    ]
    .into_iter()
    .filter_map(|kind| scene.subscribe(kind, handler(Rc::downgrade(state))))
    .collect()
}

impl Drop for Inspector {
    fn drop(&mut self) {
        for token in self.tokens.drain(..) {
            self.scene.unsubscribe(&token);
        }
        self.state.clear();
        debug!(entity = %self.entity.id(), "Closed inspector");
    }
}

impl fmt::Debug for Inspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspector")
            .field("entity", &self.entity.id())
            .field("stale", &self.is_stale())
            .field("subscriptions", &self.tokens.len())
            .finish()
    }
}
