//! Error types for backend faults
//!
//! Lookups that find nothing, operations on expired handles and name
//! collisions are not errors; they resolve to `None` or `false`. The types
//! here cover the faults a consumer cannot recover from locally.

use thiserror::Error;

/// Faults raised by the in-memory markup document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// Inserting the node would make it an ancestor of itself
    #[error("cannot insert <{child}> into <{parent}>: the new child is an ancestor of the parent")]
    HierarchyRequest { parent: String, child: String },

    /// The node to remove is not a child of the given parent
    #[error("<{child}> is not a child of <{parent}>")]
    NotAChild { parent: String, child: String },
}

/// Failure to parse a serialized attribute value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected {expected} numeric components, found {found} in {input:?}")]
    Arity {
        expected: usize,
        found: usize,
        input: String,
    },

    #[error("invalid number {token:?} in {input:?}")]
    Number { token: String, input: String },

    #[error("invalid boolean {input:?}, expected \"true\" or \"false\"")]
    Boolean { input: String },

    #[error("{input:?} is not one of the valid values")]
    EnumValue { input: String },

    #[error("attribute type {type_id} has no string form")]
    Unsupported { type_id: u32 },
}

/// Backend faults surfaced to the consumer unmodified
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("document error: {0}")]
    Dom(#[from] DomError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Reparenting would make an entity its own ancestor
    #[error("entity {entity} cannot be parented under its descendant {parent}")]
    HierarchyCycle { entity: u32, parent: u32 },

    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SceneError::HierarchyCycle {
            entity: 3,
            parent: 7,
        };
        assert_eq!(
            err.to_string(),
            "entity 3 cannot be parented under its descendant 7"
        );

        let err: SceneError = CodecError::Boolean {
            input: "yes".to_string(),
        }
        .into();
        assert!(matches!(err, SceneError::Codec(CodecError::Boolean { .. })));
        assert!(err.to_string().contains("\"yes\""));
    }
}
