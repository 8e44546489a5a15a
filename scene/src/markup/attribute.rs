use super::component::MarkupComponent;
use super::dom::Element;
use super::schema::{AttributeSpec, MarkupType};
use crate::attribute_types::{AttributeValue, EnumValue};
use crate::contracts::{Attribute, ComponentRef};
use crate::error::SceneError;
use crate::handle::Handle;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Where an attribute keeps its text form
#[derive(Debug, Clone, Copy)]
pub(crate) enum Storage {
    /// An attribute of the component element
    ElementAttribute(&'static AttributeSpec),
    /// Text content of a value element
    Text,
}

/// Attribute handle of the markup backend
pub struct MarkupAttribute {
    handle: Handle<Element>,
    component: Weak<MarkupComponent>,
    name: String,
    markup_type: MarkupType,
    storage: Storage,
}

impl MarkupAttribute {
    pub(crate) fn new(
        element: Element,
        component: Weak<MarkupComponent>,
        name: String,
        markup_type: MarkupType,
        storage: Storage,
    ) -> Rc<Self> {
        Rc::new(Self {
            handle: Handle::new(element),
            component,
            name,
            markup_type,
            storage,
        })
    }

    pub fn markup_type(&self) -> MarkupType {
        self.markup_type
    }

    /// Element holding the value, `None` once expired
    pub fn element(&self) -> Option<Element> {
        self.handle.get()
    }

    fn component(&self) -> Option<Rc<MarkupComponent>> {
        if self.handle.expired() {
            return None;
        }
        self.component.upgrade()
    }

    fn choices(&self) -> &'static [&'static str] {
        match self.storage {
            Storage::ElementAttribute(spec) => spec.choices,
            Storage::Text => &[],
        }
    }

    fn default_text(&self) -> &'static str {
        match self.storage {
            Storage::ElementAttribute(spec) => spec.default,
            Storage::Text => self.markup_type.default_text(),
        }
    }

    /// Stored text, the schema default for absent element attributes
    fn raw(&self) -> Option<String> {
        let element = self.handle.get()?;
        Some(match self.storage {
            Storage::ElementAttribute(_) => element
                .attribute(&self.name)
                .unwrap_or_else(|| self.default_text().to_string()),
            Storage::Text => element.text(),
        })
    }

    pub(crate) fn expire(&self) {
        self.handle.expire();
    }
}

impl Attribute for MarkupAttribute {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn type_id(&self) -> u32 {
        self.markup_type.id()
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn index(&self) -> Option<usize> {
        self.component()?
            .layout()
            .iter()
            .position(|name| *name == self.name)
    }

    fn owner(&self) -> Option<ComponentRef> {
        self.component().map(|component| component as ComponentRef)
    }

    fn get(&self) -> Option<AttributeValue> {
        let raw = self.raw()?;
        match self.markup_type.parse(&raw, self.choices()) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(attribute = %self.name, error = %err, "Unparsable markup value, using default");
                self.markup_type
                    .parse(self.default_text(), self.choices())
                    .ok()
            }
        }
    }

    fn set(&self, value: AttributeValue) -> bool {
        let Some(element) = self.handle.get() else {
            return false;
        };
        if !self.markup_type.accepts(&value, self.choices()) {
            debug!(attribute = %self.name, value = %value, "Rejected value of the wrong shape");
            return false;
        }
        let value = self.markup_type.normalize(value);
        if self.get().as_ref() == Some(&value) {
            return true;
        }

        // The bridge turns the write into an AttributeChanged event
        let text = self.markup_type.format(&value);
        match self.storage {
            Storage::ElementAttribute(_) => element.set_attribute(&self.name, &text),
            Storage::Text => element.set_text(&text),
        }
        true
    }

    fn valid_values(&self) -> Option<Vec<EnumValue>> {
        if self.handle.expired() {
            return None;
        }
        match self.storage {
            Storage::ElementAttribute(spec) => spec.valid_values(),
            Storage::Text => None,
        }
    }

    fn to_display_string(&self) -> Option<String> {
        self.get().map(|value| self.markup_type.format(&value))
    }

    fn set_from_string(&self, text: &str) -> Result<bool, SceneError> {
        if self.handle.expired() {
            return Ok(false);
        }
        match self.markup_type.parse(text, self.choices()) {
            Ok(value) => Ok(self.set(value)),
            Err(err) => {
                warn!(attribute = %self.name, error = %err, "Rejected markup text");
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for MarkupAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupAttribute")
            .field("name", &self.name)
            .field("type", &self.markup_type)
            .field("handle", &self.handle)
            .finish()
    }
}
