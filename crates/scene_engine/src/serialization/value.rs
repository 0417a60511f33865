//! Intermediate serialized representation
//!
//! The scene-graph core never walks concrete component types; it moves
//! data through an opaque tree of named fields. The tree is what the
//! diffing machinery compares and what clone and prefab operations decode
//! from. Embedded object references are stored as instance ids and
//! resolved in a batch pass at the end of a deserialization session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::foundation::math::{Quat, Quaternion, Vec3};
use crate::scene::object::InstanceId;

/// A single serialized field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SerializedValue {
    /// Boolean field
    Bool(bool),
    /// Signed integer field
    Int(i64),
    /// Unsigned integer field
    UInt(u64),
    /// Floating point field
    Float(f32),
    /// String field
    String(String),
    /// UUID field
    Uuid(Uuid),
    /// 3D vector field
    Vec3([f32; 3]),
    /// Quaternion field, stored as (x, y, z, w)
    Quat([f32; 4]),
    /// Reference to another game object by instance id (0 for null)
    Handle(InstanceId),
    /// Ordered list of values
    Array(Vec<SerializedValue>),
    /// Nested object
    Object(SerializedObject),
}

impl SerializedValue {
    /// Wrap a math vector
    pub fn vec3(value: Vec3) -> Self {
        Self::Vec3([value.x, value.y, value.z])
    }

    /// Wrap a rotation quaternion
    pub fn quat(value: Quat) -> Self {
        let coords = value.coords;
        Self::Quat([coords.x, coords.y, coords.z, coords.w])
    }

    /// Read as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as a signed integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as an unsigned integer
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as a float
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Read as a UUID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as a math vector
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3([x, y, z]) => Some(Vec3::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Read as a rotation quaternion
    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            Self::Quat([x, y, z, w]) => {
                Some(Quat::new_normalize(Quaternion::new(*w, *x, *y, *z)))
            }
            _ => None,
        }
    }

    /// Read as a handle reference
    pub fn as_handle(&self) -> Option<InstanceId> {
        match self {
            Self::Handle(id) => Some(*id),
            _ => None,
        }
    }

    /// Read as an array slice
    pub fn as_array(&self) -> Option<&[SerializedValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Read as a nested object
    pub fn as_object(&self) -> Option<&SerializedObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// An opaque tree of named fields
///
/// `type_key` names the reflective type that produced the tree so a
/// decoder can route it to the right constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedObject {
    /// Reflective type name of the encoded object
    pub type_key: String,
    /// Named field values, ordered by name
    pub fields: BTreeMap<String, SerializedValue>,
}

impl SerializedObject {
    /// Create an empty object for the given type
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Insert or replace a field
    pub fn set(&mut self, name: impl Into<String>, value: SerializedValue) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&SerializedValue> {
        self.fields.get(name)
    }

    /// Whether the object carries no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Collect every handle reference embedded anywhere in the tree
    pub fn collect_handles(&self, out: &mut Vec<InstanceId>) {
        for value in self.fields.values() {
            collect_handles_in_value(value, out);
        }
    }
}

fn collect_handles_in_value(value: &SerializedValue, out: &mut Vec<InstanceId>) {
    match value {
        SerializedValue::Handle(id) => {
            if *id != 0 {
                out.push(*id);
            }
        }
        SerializedValue::Array(values) => {
            for nested in values {
                collect_handles_in_value(nested, out);
            }
        }
        SerializedValue::Object(object) => object.collect_handles(out),
        _ => {}
    }
}
