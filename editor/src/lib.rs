//! Generic scene editor
//!
//! This crate provides the editor-side models for entity management and
//! attribute editing. It is written only against the scene contracts, so the
//! same hierarchy, inspector and scene operations work for every backend.

pub mod array_rows;
pub mod context;
pub mod hierarchy;
pub mod inspector;
pub mod scene_operations;
pub mod settings;
pub mod shared_state;

pub use context::EditorContext;
pub use inspector::{FieldEditor, Inspector};
pub use settings::EditorSettings;
