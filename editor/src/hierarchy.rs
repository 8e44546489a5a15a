//! Scene hierarchy model
//!
//! Builds the entity tree shown by the hierarchy view from the scene's root
//! entities and their children.

use crate::settings::HierarchySettings;
use scene::prelude::{Entity, EntityId, EntityRef, Scene};
use tracing::debug;

/// One entity in the hierarchy tree
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub id: EntityId,
    pub label: String,
    pub local: bool,
    pub temporary: bool,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    fn build(entity: &EntityRef, settings: &HierarchySettings) -> Option<Self> {
        if entity.expired() || !is_shown(entity.as_ref(), settings) {
            return None;
        }
        let children = entity
            .children()
            .iter()
            .filter_map(|child| Self::build(child, settings))
            .collect();
        Some(Self {
            id: entity.id(),
            label: entity_label(entity.as_ref()),
            local: entity.is_local(),
            temporary: entity.is_temporary(),
            children,
        })
    }

    /// Find the node for `id` in this subtree
    pub fn find(&self, id: EntityId) -> Option<&HierarchyNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

fn is_shown(entity: &dyn Entity, settings: &HierarchySettings) -> bool {
    (settings.show_local_entities || !entity.is_local())
        && (settings.show_temporary_entities || !entity.is_temporary())
}

/// Display label for an entity
pub fn entity_label(entity: &dyn Entity) -> String {
    let name = entity.name();
    if name.is_empty() {
        format!("Entity {}", entity.id())
    } else {
        name
    }
}

/// Tree of every shown entity, roots in scene order
pub fn build_hierarchy(scene: &dyn Scene, settings: &HierarchySettings) -> Vec<HierarchyNode> {
    let roots: Vec<_> = scene
        .entities()
        .iter()
        .filter_map(|entity| HierarchyNode::build(entity, settings))
        .collect();
    debug!(roots = roots.len(), "Built scene hierarchy");
    roots
}

/// Depth-first rows with their indentation depth, for list-style rendering
pub fn flatten(nodes: &[HierarchyNode]) -> Vec<(usize, &HierarchyNode)> {
    fn visit<'a>(node: &'a HierarchyNode, depth: usize, out: &mut Vec<(usize, &'a HierarchyNode)>) {
        out.push((depth, node));
        for child in &node.children {
            visit(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    for node in nodes {
        visit(node, 0, &mut out);
    }
    out
}
