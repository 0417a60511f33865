//! Component type registry and decode context
//!
//! Decoding a serialized graph has to turn type names back into concrete
//! component values. The registry maps each reflective type name to a
//! constructor; the scene-graph core never depends on a global reflection
//! singleton, only on this narrow table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::error::SceneError;
use crate::scene::component::{Component, ReflectComponent};
use crate::scene::handle::GameObjectHandle;
use crate::scene::object::InstanceId;
use crate::scene::registry::ObjectRegistry;

use super::value::SerializedObject;

/// Decode-time services handed to component constructors
///
/// Wraps the registry so handle fields can register themselves for the
/// batch resolution pass at the end of the active session.
pub struct DecodeContext<'a> {
    registry: &'a mut ObjectRegistry,
}

impl<'a> DecodeContext<'a> {
    /// Wrap a registry with an active deserialization session
    pub fn new(registry: &'a mut ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Produce a handle for a decoded reference to `original_id`
    ///
    /// Returns a null handle for id 0. Otherwise the handle resolves when
    /// the surrounding session ends.
    ///
    /// # Panics
    ///
    /// Panics when no deserialization session is active.
    pub fn handle(&mut self, original_id: InstanceId) -> GameObjectHandle {
        if original_id == 0 {
            GameObjectHandle::null()
        } else {
            self.registry.session_handle(original_id)
        }
    }
}

type ComponentCtor = Box<
    dyn Fn(
        &SerializedObject,
        &mut DecodeContext<'_>,
    ) -> Result<Rc<RefCell<dyn Component>>, SceneError>,
>;

/// Table of per-type component constructors
#[derive(Default)]
pub struct ComponentTypeRegistry {
    ctors: HashMap<String, ComponentCtor>,
}

impl ComponentTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete component type
    ///
    /// Re-registering a type name replaces the previous constructor.
    pub fn register<C: ReflectComponent + 'static>(&mut self) {
        self.ctors.insert(
            C::TYPE_KEY.to_string(),
            Box::new(|data, ctx| {
                let component = C::decode(data, ctx)?;
                Ok(Rc::new(RefCell::new(component)) as Rc<RefCell<dyn Component>>)
            }),
        );
    }

    /// Whether a type name has a registered constructor
    pub fn is_registered(&self, type_key: &str) -> bool {
        self.ctors.contains_key(type_key)
    }

    /// Rebuild a component from its encoded form
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownComponentType`] when the type was
    /// never registered, or whatever the constructor reports.
    pub fn decode(
        &self,
        type_key: &str,
        data: &SerializedObject,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Rc<RefCell<dyn Component>>, SceneError> {
        let ctor = self
            .ctors
            .get(type_key)
            .ok_or_else(|| SceneError::UnknownComponentType(type_key.to_string()))?;
        ctor(data, ctx)
    }
}
