use super::component::NativeComponent;
use super::types::NativeType;
use crate::attribute_types::{AttributeValue, EnumValue};
use crate::contracts::{Attribute, ComponentRef};
use crate::error::SceneError;
use crate::handle::Handle;
use std::rc::{Rc, Weak};

/// Attribute handle of the native backend
pub struct NativeAttribute {
    handle: Handle<hecs::Entity>,
    component: Weak<NativeComponent>,
    name: String,
    native_type: NativeType,
    valid_values: Option<Vec<EnumValue>>,
}

impl NativeAttribute {
    pub(crate) fn new(
        node: hecs::Entity,
        component: Weak<NativeComponent>,
        name: String,
        native_type: NativeType,
        valid_values: Option<Vec<EnumValue>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            handle: Handle::new(node),
            component,
            name,
            native_type,
            valid_values,
        })
    }

    pub fn native_type(&self) -> NativeType {
        self.native_type
    }

    fn component(&self) -> Option<Rc<NativeComponent>> {
        if self.handle.expired() {
            return None;
        }
        self.component.upgrade()
    }

    pub(crate) fn expire(&self) {
        self.handle.expire();
    }
}

impl Attribute for NativeAttribute {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn type_id(&self) -> u32 {
        self.native_type.id()
    }

    fn expired(&self) -> bool {
        self.handle.expired()
    }

    fn index(&self) -> Option<usize> {
        self.component()?
            .layout()
            .iter()
            .position(|(name, _)| *name == self.name)
    }

    fn owner(&self) -> Option<ComponentRef> {
        self.component().map(|component| component as ComponentRef)
    }

    fn get(&self) -> Option<AttributeValue> {
        self.component()?.read(&self.name)
    }

    fn set(&self, value: AttributeValue) -> bool {
        match self.component() {
            Some(component) => component.write(&self.name, value),
            None => false,
        }
    }

    fn valid_values(&self) -> Option<Vec<EnumValue>> {
        if self.handle.expired() {
            return None;
        }
        self.valid_values.clone()
    }

    fn to_display_string(&self) -> Option<String> {
        self.get().map(|value| self.native_type.format(&value))
    }

    fn set_from_string(&self, text: &str) -> Result<bool, SceneError> {
        if self.handle.expired() {
            return Ok(false);
        }
        let value = self.native_type.parse(text)?;
        Ok(self.set(value))
    }
}

impl std::fmt::Debug for NativeAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeAttribute")
            .field("name", &self.name)
            .field("type", &self.native_type)
            .field("handle", &self.handle)
            .finish()
    }
}
