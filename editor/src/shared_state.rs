//! Shared state for editor views
//!
//! The hierarchy, the inspector and the scene event handlers all read and
//! update the same selection and modification flags. Everything runs on the
//! editor thread, so the state lives behind `Rc<RefCell<_>>`; a failed borrow
//! means a view touched the state from inside another view's update and is
//! logged instead of panicking.

use scene::prelude::EntityId;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

/// Editor state shared between views
#[derive(Debug, Default)]
pub struct SharedEditorState {
    /// Currently selected entity in the hierarchy
    pub selected_entity: Option<EntityId>,
    /// Whether the scene has been modified since last save
    pub scene_modified: bool,
    /// Current scene file path
    pub current_scene_path: Option<PathBuf>,
}

impl SharedEditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the selected entity
    pub fn set_selected_entity(&mut self, entity: Option<EntityId>) {
        if self.selected_entity != entity {
            debug!(
                "Selected entity changed: {:?} -> {:?}",
                self.selected_entity, entity
            );
            self.selected_entity = entity;
        }
    }

    /// Mark the scene as modified
    pub fn mark_scene_modified(&mut self) {
        if !self.scene_modified {
            debug!("Scene marked as modified");
            self.scene_modified = true;
        }
    }

    /// Mark the scene as saved
    pub fn mark_scene_saved(&mut self) {
        if self.scene_modified {
            debug!("Scene marked as saved");
            self.scene_modified = false;
        }
    }

    /// Set the current scene path
    pub fn set_scene_path(&mut self, path: Option<PathBuf>) {
        if self.current_scene_path != path {
            debug!(
                "Scene path changed: {:?} -> {:?}",
                self.current_scene_path, path
            );
            self.current_scene_path = path;
        }
    }
}

/// Handle to the shared editor state
pub type SharedEditorStateHandle = Rc<RefCell<SharedEditorState>>;

/// Create a new shared editor state handle
pub fn create_shared_state() -> SharedEditorStateHandle {
    Rc::new(RefCell::new(SharedEditorState::new()))
}

/// Update the selected entity
pub fn update_selected_entity(shared_state: &SharedEditorStateHandle, entity: Option<EntityId>) {
    match shared_state.try_borrow_mut() {
        Ok(mut state) => state.set_selected_entity(entity),
        Err(e) => warn!("Failed to borrow shared state for entity selection: {}", e),
    }
}

/// Mark the scene as modified
pub fn mark_scene_modified(shared_state: &SharedEditorStateHandle) {
    match shared_state.try_borrow_mut() {
        Ok(mut state) => state.mark_scene_modified(),
        Err(e) => warn!("Failed to borrow shared state for scene modification: {}", e),
    }
}

/// Get the currently selected entity
pub fn get_selected_entity(shared_state: &SharedEditorStateHandle) -> Option<EntityId> {
    match shared_state.try_borrow() {
        Ok(state) => state.selected_entity,
        Err(e) => {
            warn!(
                "Failed to borrow shared state for reading selected entity: {}",
                e
            );
            None
        }
    }
}

/// Check whether the scene is modified
pub fn is_scene_modified(shared_state: &SharedEditorStateHandle) -> bool {
    match shared_state.try_borrow() {
        Ok(state) => state.scene_modified,
        Err(e) => {
            warn!(
                "Failed to borrow shared state for reading scene modification: {}",
                e
            );
            false
        }
    }
}
