//! Scene operation handlers
//!
//! Operations triggered from the editor UI. They go through the scene
//! contracts only, so the same code populates every backend; component types
//! are looked up by role instead of by a backend's own type names.

use glam::Vec3;
use scene::prelude::*;
use tracing::{debug, info, warn};

/// Component type names, unprefixed and lowercase, that can hold a camera
const CAMERA_TYPES: &[&str] = &["camera", "view"];
/// Component types that render a mesh
const MESH_TYPES: &[&str] = &["mesh"];
/// Component types that carry an entity's placement when it is not intrinsic
const PLACEMENT_TYPES: &[&str] = &["placeable"];
/// Attributes naming the mesh asset of a mesh component
const MESH_SOURCE_ATTRIBUTES: &[&str] = &["meshRef", "src"];

/// Entities created by [`create_default_scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultScene {
    pub camera: EntityId,
    pub cube: EntityId,
    pub plane: EntityId,
}

/// Remove every entity; returns how many root entities were removed
pub fn clear_scene(scene: &dyn Scene) -> usize {
    let roots = scene.entities();
    let removed = roots
        .iter()
        .filter(|entity| scene.remove_entity(entity.id()))
        .count();
    debug!(removed, "Cleared scene");
    removed
}

/// Create a default scene with a camera, a cube and a ground plane
///
/// Returns `None` if the backend has no camera or mesh component type.
pub fn create_default_scene(scene: &dyn Scene) -> Option<DefaultScene> {
    info!(backend = scene.backend_name(), "Creating default scene");

    let Some(camera_type) = find_component_type(scene, CAMERA_TYPES) else {
        scene.log_warning("No camera component type, cannot create a default scene");
        return None;
    };
    let Some(mesh_type) = find_component_type(scene, MESH_TYPES) else {
        scene.log_warning("No mesh component type, cannot create a default scene");
        return None;
    };
    let placement = find_component_type(scene, PLACEMENT_TYPES);

    clear_scene(scene);

    // Looking at the origin from above and behind
    let eye = Vec3::new(0.0, 5.0, 10.0);
    let pitch = -(eye.y.atan2(eye.z)).to_degrees();
    let mut camera_transform = TransformValue::from_position(eye);
    camera_transform.rotation.x = pitch;

    let camera = spawn(
        scene,
        "Main Camera",
        &camera_type,
        placement.as_deref(),
        camera_transform,
    )?;
    let cube = spawn(
        scene,
        "Default Cube",
        &mesh_type,
        placement.as_deref(),
        TransformValue::from_position(Vec3::ZERO),
    )?;
    let plane = spawn(
        scene,
        "Ground Plane",
        &mesh_type,
        placement.as_deref(),
        TransformValue::from_position(Vec3::new(0.0, -1.0, 0.0))
            .with_scale(Vec3::new(20.0, 0.1, 20.0)),
    )?;

    set_mesh_source(cube.as_ref(), &mesh_type, "cube.mesh");
    set_mesh_source(plane.as_ref(), &mesh_type, "plane.mesh");

    info!(
        "Default scene created with {} entities",
        scene.all_entities().len()
    );
    Some(DefaultScene {
        camera: camera.id(),
        cube: cube.id(),
        plane: plane.id(),
    })
}

/// Registered component type whose plain name matches one of `candidates`
pub fn find_component_type(scene: &dyn Scene, candidates: &[&str]) -> Option<String> {
    scene
        .component_types()
        .into_iter()
        .map(|info| info.name)
        .find(|name| {
            let plain = scene.component_name_without_prefix(name).to_lowercase();
            candidates.contains(&plain.as_str())
        })
}

fn spawn(
    scene: &dyn Scene,
    name: &str,
    role: &str,
    placement: Option<&str>,
    transform: TransformValue,
) -> Option<EntityRef> {
    let mut components = vec![role];
    components.extend(placement);

    let entity = scene.create_entity(&components, Locality::Replicated, None)?;
    entity.set_name(name);
    if !place(scene, entity.as_ref(), transform) {
        warn!(entity = %entity.id(), name, "Entity has no transform attribute");
    }
    Some(entity)
}

/// Write `transform` to the first transform-classified attribute of `entity`
pub fn place(scene: &dyn Scene, entity: &dyn Entity, transform: TransformValue) -> bool {
    entity
        .components()
        .iter()
        .flat_map(|component| component.attributes())
        .find(|attribute| {
            classify(scene, attribute.type_id()) == Ok(AttributeClass::Transform)
        })
        .is_some_and(|attribute| attribute.set(AttributeValue::Transform(transform)))
}

fn set_mesh_source(entity: &dyn Entity, mesh_type: &str, source: &str) {
    let Some(mesh) = entity.component(mesh_type, None) else {
        return;
    };
    if let Some(attribute) = MESH_SOURCE_ATTRIBUTES
        .iter()
        .find_map(|name| mesh.attribute(name))
    {
        attribute.set(AttributeValue::String(source.to_string()));
    }
}
