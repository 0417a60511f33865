//! Error types shared across the scene-graph core
//!
//! Expected-miss lookups never surface here; those return `Option`. These
//! errors cover decode failures and invalid caller input that a caller can
//! reasonably branch on. Precondition violations and structural corruption
//! panic instead, since they indicate a bug rather than a recoverable
//! condition.

use thiserror::Error;

/// Errors produced by scene-graph operations
#[derive(Debug, Error)]
pub enum SceneError {
    /// The referenced object no longer exists
    #[error("object is destroyed")]
    ObjectDestroyed,

    /// A serialized component names a type the registry has never seen
    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    /// Serialized data is missing a field or holds the wrong value kind
    #[error("malformed serialized data: {0}")]
    MalformedData(String),

    /// A prefab operation was attempted on an object without a prefab link
    #[error("object '{0}' is not linked to a prefab")]
    NotAPrefabInstance(String),
}
