//! The narrow serialization contract the scene-graph core depends on
//!
//! Object graphs move through an opaque intermediate tree of named
//! fields; the core never inspects concrete component types. Cloning,
//! prefab storage and diff payloads all ride on this representation, and
//! embedded handle references are resolved in a batch pass at the end of
//! the surrounding deserialization session.

pub mod diff;
pub(crate) mod scene;
pub mod type_registry;
pub mod value;

pub use diff::generate_diff;
pub use type_registry::{ComponentTypeRegistry, DecodeContext};
pub use value::{SerializedObject, SerializedValue};
