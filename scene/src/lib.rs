//! Scene abstraction layer
//!
//! This crate lets a generic property editor operate over interchangeable scene
//! backends. It defines the scene, entity, component and attribute contracts,
//! the callback registry used for change notification, the attribute type
//! classification protocol and the handle liveness model, together with two
//! concrete backends: a native entity-component scene stored in a `hecs` world
//! and a declarative markup scene graph built on an observable DOM.

pub mod attribute_types;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod error;
pub mod handle;
pub mod markup;
pub mod native;
pub mod raycast;

// Re-export commonly used types
pub mod prelude {
    pub use crate::attribute_types::{
        classify, AttributeClass, AttributeTypeSystem, AttributeValue, EnumValue, TransformValue,
        UnsupportedType,
    };
    pub use crate::callbacks::{CallbackId, CallbackRegistry};
    pub use crate::config::SceneConfig;
    pub use crate::contracts::{
        Attribute, AttributeRef, Component, ComponentId, ComponentRef, ComponentTypeInfo, Entity,
        EntityId, EntityRef, EventHandler, EventKind, EventTarget, EventToken, Locality, Scene, SceneEvent,
        SceneRef,
    };
    pub use crate::error::{CodecError, DomError, SceneError};
    pub use crate::markup::MarkupScene;
    pub use crate::native::NativeScene;
    pub use crate::raycast::{Ray, RaycastResult};

    pub use glam::{Vec2, Vec3};
}

/// Initialize logging for the scene layer and its consumers
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
