//! Editor context
//!
//! Everything the editor views need is injected here at construction: the
//! scene they edit, the user settings and the shared selection state. The
//! context tracks scene modifications through the canonical scene events.

use crate::hierarchy::{build_hierarchy, HierarchyNode};
use crate::inspector::Inspector;
use crate::scene_operations::{self, DefaultScene};
use crate::settings::EditorSettings;
use crate::shared_state::{
    create_shared_state, get_selected_entity, is_scene_modified, mark_scene_modified,
    update_selected_entity, SharedEditorStateHandle,
};
use scene::prelude::*;
use std::rc::Rc;
use tracing::{debug, info};

/// Scene, settings and selection shared by the editor views
pub struct EditorContext {
    scene: SceneRef,
    settings: EditorSettings,
    shared: SharedEditorStateHandle,
    inspector: Option<Inspector>,
    tokens: Vec<EventToken>,
}

impl EditorContext {
    pub fn new(scene: SceneRef, settings: EditorSettings) -> Self {
        let shared = create_shared_state();
        let tokens = [
            EventKind::EntityCreated,
            EventKind::EntityRemoved,
            EventKind::ComponentCreated,
            EventKind::ComponentRemoved,
            EventKind::AttributeChanged,
        ]
        .into_iter()
        .filter_map(|kind| {
            let shared = Rc::downgrade(&shared);
            scene.subscribe(
                kind,
                Box::new(move |_: &SceneEvent| {
                    if let Some(shared) = shared.upgrade() {
                        mark_scene_modified(&shared);
                    }
                }),
            )
        })
        .collect();

        info!(backend = scene.backend_name(), "Editor context created");
        Self {
            scene,
            settings,
            shared,
            inspector: None,
            tokens,
        }
    }

    pub fn scene(&self) -> &SceneRef {
        &self.scene
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Replace the settings; an open inspector is reopened to apply them
    pub fn set_settings(&mut self, settings: EditorSettings) {
        self.settings = settings;
        if let Some(id) = self.inspector.as_ref().map(Inspector::entity_id) {
            self.inspector = Inspector::open(self.scene.clone(), id, self.settings.inspector.clone());
        }
    }

    pub fn shared_state(&self) -> &SharedEditorStateHandle {
        &self.shared
    }

    pub fn is_modified(&self) -> bool {
        is_scene_modified(&self.shared)
    }

    /// Entity tree for the hierarchy view
    pub fn hierarchy(&self) -> Vec<HierarchyNode> {
        build_hierarchy(self.scene.as_ref(), &self.settings.hierarchy)
    }

    /// Select an entity and open its inspector; unknown ids clear the selection
    pub fn select(&mut self, id: Option<EntityId>) -> bool {
        let inspector = id.and_then(|id| {
            Inspector::open(self.scene.clone(), id, self.settings.inspector.clone())
        });
        let selected = inspector.as_ref().map(Inspector::entity_id);
        self.inspector = inspector;
        update_selected_entity(&self.shared, selected);
        selected.is_some() || id.is_none()
    }

    /// Currently selected entity; a removed selection is cleared
    pub fn selected_entity(&mut self) -> Option<EntityRef> {
        let id = get_selected_entity(&self.shared)?;
        match self.scene.entity_by_id(id) {
            Some(entity) => Some(entity),
            None => {
                debug!(entity = %id, "Selected entity no longer exists");
                self.select(None);
                None
            }
        }
    }

    /// Inspector of the selection, closed once its entity is gone
    pub fn inspector(&mut self) -> Option<&Inspector> {
        if self.inspector.as_ref().is_some_and(Inspector::is_stale) {
            self.select(None);
        }
        self.inspector.as_ref()
    }

    /// Select the entity under viewport coordinates
    pub fn pick(&mut self, x: f32, y: f32) -> Option<EntityId> {
        let hit = self.scene.raycast(x, y)?.entity?.id();
        self.select(Some(hit));
        Some(hit)
    }

    /// Replace the scene contents with the default scene
    pub fn create_default_scene(&mut self) -> Option<DefaultScene> {
        self.select(None);
        scene_operations::create_default_scene(self.scene.as_ref())
    }

    /// Create an empty named entity under the selection, or at the root
    pub fn create_entity(&mut self, name: &str) -> Option<EntityId> {
        let parent = get_selected_entity(&self.shared);
        let entity = self
            .scene
            .create_entity(&[], Locality::Replicated, parent)?;
        entity.set_name(name);
        Some(entity.id())
    }

    /// Remove the selected entity and its descendants
    pub fn remove_selected(&mut self) -> bool {
        let Some(id) = get_selected_entity(&self.shared) else {
            return false;
        };
        let removed = self.scene.remove_entity(id);
        self.select(None);
        removed
    }

    /// Move the selected entity under `parent`, or to the root
    pub fn reparent_selected(&mut self, parent: Option<EntityId>) -> Result<bool, SceneError> {
        let Some(id) = get_selected_entity(&self.shared) else {
            return Ok(false);
        };
        self.scene.set_parent(id, parent)
    }
}

impl Drop for EditorContext {
    fn drop(&mut self) {
        self.inspector = None;
        for token in self.tokens.drain(..) {
            self.scene.unsubscribe(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::FieldEditor;

    fn context(scene: SceneRef) -> EditorContext {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        EditorContext::new(scene, EditorSettings::default())
    }

    #[test]
    fn test_selection_opens_inspector() {
        let mut ctx = context(Rc::new(NativeScene::new()));
        let id = ctx.create_entity("Box").unwrap();

        assert!(ctx.select(Some(id)));
        assert_eq!(ctx.selected_entity().unwrap().name(), "Box");
        assert_eq!(ctx.inspector().unwrap().entity_id(), id);

        assert!(!ctx.select(Some(EntityId(999))));
        assert!(ctx.selected_entity().is_none());
        assert!(ctx.inspector().is_none());
    }

    #[test]
    fn test_modifications_are_tracked() {
        let mut ctx = context(Rc::new(MarkupScene::new()));
        assert!(!ctx.is_modified());

        ctx.create_entity("Light").unwrap();
        assert!(ctx.is_modified());

        ctx.shared_state().borrow_mut().mark_scene_saved();
        let entity = ctx.scene().entities().pop().unwrap();
        entity.create_component("light", None, false).unwrap();
        assert!(ctx.is_modified());
    }

    #[test]
    fn test_removed_selection_is_cleared() {
        for scene in [
            Rc::new(NativeScene::new()) as SceneRef,
            Rc::new(MarkupScene::new()) as SceneRef,
        ] {
            let mut ctx = context(scene.clone());
            let parent = ctx.create_entity("Parent").unwrap();
            ctx.select(Some(parent));
            let child = ctx.create_entity("Child").unwrap();
            assert_eq!(scene.entity_by_id(child).unwrap().parent_id(), Some(parent));

            // Removed behind the editor's back
            assert!(scene.remove_entity(parent));
            assert!(ctx.inspector().is_none());
            assert!(ctx.selected_entity().is_none());
            assert!(!ctx.remove_selected());
        }
    }

    #[test]
    fn test_pick_selects_hit_entity() {
        let mut ctx = context(Rc::new(NativeScene::new()));
        let created = ctx.create_default_scene().unwrap();

        let (width, height) = SceneConfig::default().viewport();
        assert_eq!(ctx.pick(width as f32 / 2.0, height as f32 / 2.0), Some(created.cube));
        assert_eq!(ctx.selected_entity().unwrap().id(), created.cube);
        assert_eq!(ctx.pick(0.0, 0.0), None);
    }

    #[test]
    fn test_reparent_selected() {
        let mut ctx = context(Rc::new(NativeScene::new()));
        let a = ctx.create_entity("A").unwrap();
        let b = ctx.create_entity("B").unwrap();

        ctx.select(Some(a));
        assert!(ctx.reparent_selected(Some(b)).unwrap());
        assert_eq!(ctx.hierarchy()[0].children[0].id, a);

        ctx.select(Some(b));
        assert!(matches!(
            ctx.reparent_selected(Some(a)),
            Err(SceneError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn test_settings_change_reopens_inspector() {
        let mut ctx = context(Rc::new(NativeScene::new()));
        let id = ctx.create_entity("Box").unwrap();
        ctx.select(Some(id));
        assert_eq!(ctx.inspector().unwrap().sections().len(), 2);

        let mut settings = ctx.settings().clone();
        settings.inspector.show_fixed_component = false;
        ctx.set_settings(settings);

        let inspector = ctx.inspector().unwrap();
        let sections = inspector.sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections[0].row("name").map(|row| row.editor.clone()),
            Some(FieldEditor::Text("Box".into()))
        );
    }
}
