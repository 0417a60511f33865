//! Common game-object identity and flag contracts
//!
//! Scene objects and components both carry an [`ObjectCore`]: the
//! process-unique instance id, the prefab-scoped link id, a display name
//! and the destroyed tombstone. The core also owns the indirection record
//! the handle layer points at, which is swappable when restoring identity
//! after a prefab refresh.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use super::handle::{GameObjectHandle, InstanceData};

/// Process-unique identifier assigned at registration time
pub type InstanceId = u64;

/// Secondary, prefab-scoped identifier used for structural matching
pub type LinkId = u32;

/// Sentinel meaning "no link id assigned"
pub const LINK_ID_NONE: LinkId = u32::MAX;

bitflags! {
    /// Behavior flags carried by a scene object
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SceneObjectFlags: u32 {
        /// Do not activate components when the hierarchy is instantiated
        const DONT_INSTANTIATE = 1;
        /// Exclude this object from prefab storage and saved scenes
        const DONT_SAVE = 1 << 1;
        /// Keep this object alive across scene clears
        const PERSISTENT = 1 << 2;
        /// Engine-internal object hidden from user-facing queries
        const INTERNAL = 1 << 3;
    }
}

bitflags! {
    /// Behavior flags carried by a component
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ComponentFlags: u32 {
        /// Run lifecycle callbacks regardless of the global run state
        const ALWAYS_RUN = 1;
    }
}

bitflags! {
    /// Kinds of change reported through transform-changed notifications
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransformChangedFlags: u32 {
        /// The object's transform changed
        const TRANSFORM = 1;
        /// The object's parent changed
        const PARENT = 1 << 1;
        /// The object's mobility tier changed
        const MOBILITY = 1 << 2;
    }
}

bitflags! {
    /// Which scalar fields differ between a prefab node and its instance
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SceneObjectDiffFlags: u32 {
        /// Display name differs
        const NAME = 1;
        /// Local translation differs
        const TRANSLATION = 1 << 1;
        /// Local rotation differs
        const ROTATION = 1 << 2;
        /// Local scale differs
        const SCALE = 1 << 3;
        /// Explicit active flag differs
        const ACTIVE = 1 << 4;
    }
}

/// Mobility tier of a scene object
///
/// Anything other than `Movable` rejects transform mutation and opts out
/// of inheriting the parent's world transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mobility {
    /// Freely movable, inherits parent transform changes
    #[default]
    Movable,
    /// Cannot be moved through mutators, but may be repositioned by
    /// engine-internal restore paths
    Immovable,
    /// Never moves after creation
    Static,
}

impl Mobility {
    /// Whether transform mutators are permitted
    pub fn is_movable(self) -> bool {
        matches!(self, Self::Movable)
    }

    /// Stable numeric form used by the serializer
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Movable => 0,
            Self::Immovable => 1,
            Self::Static => 2,
        }
    }

    /// Decode the numeric form, defaulting unknown values to `Movable`
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Immovable,
            2 => Self::Static,
            _ => Self::Movable,
        }
    }
}

/// Identity state shared by scene objects and components
#[derive(Debug)]
pub struct ObjectCore {
    name: String,
    instance_id: InstanceId,
    link_id: LinkId,
    destroyed: bool,
    instance_data: Option<Rc<RefCell<InstanceData>>>,
}

impl ObjectCore {
    /// Create an unregistered core with the given display name
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: 0,
            link_id: LINK_ID_NONE,
            destroyed: false,
            instance_data: None,
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the object
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Process-unique instance id (0 until registered)
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Prefab-scoped link id, [`LINK_ID_NONE`] when unlinked
    pub fn link_id(&self) -> LinkId {
        self.link_id
    }

    /// Assign or clear the prefab-scoped link id
    pub fn set_link_id(&mut self, link_id: LinkId) {
        self.link_id = link_id;
    }

    /// Whether this object has been torn down
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    pub(crate) fn set_instance_id(&mut self, id: InstanceId) {
        self.instance_id = id;
    }

    /// Adopt the identity produced by registry registration
    pub(crate) fn attach_registration(&mut self, handle: &GameObjectHandle) {
        self.instance_id = handle.instance_id();
        self.instance_data = handle.data().cloned();
    }

    /// Swap the indirection record, used when restoring identity linkage
    pub(crate) fn replace_instance_data(
        &mut self,
        data: Rc<RefCell<InstanceData>>,
        instance_id: InstanceId,
    ) {
        self.instance_data = Some(data);
        self.instance_id = instance_id;
    }

    /// A fresh handle sharing this object's indirection record
    pub fn handle(&self) -> GameObjectHandle {
        match &self.instance_data {
            Some(data) => GameObjectHandle::from_data(Rc::clone(data)),
            None => GameObjectHandle::null(),
        }
    }

    pub(crate) fn instance_data(&self) -> Option<&Rc<RefCell<InstanceData>>> {
        self.instance_data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent_bits() {
        let combined = SceneObjectFlags::DONT_INSTANTIATE | SceneObjectFlags::PERSISTENT;
        assert!(combined.contains(SceneObjectFlags::DONT_INSTANTIATE));
        assert!(combined.contains(SceneObjectFlags::PERSISTENT));
        assert!(!combined.contains(SceneObjectFlags::DONT_SAVE));
    }

    #[test]
    fn test_mobility_raw_roundtrip() {
        for mobility in [Mobility::Movable, Mobility::Immovable, Mobility::Static] {
            assert_eq!(Mobility::from_raw(mobility.to_raw()), mobility);
        }
        assert!(Mobility::Movable.is_movable());
        assert!(!Mobility::Static.is_movable());
    }

    #[test]
    fn test_unregistered_core_has_null_handle() {
        let core = ObjectCore::new("orphan");
        assert_eq!(core.instance_id(), 0);
        assert_eq!(core.link_id(), LINK_ID_NONE);
        assert!(core.handle().is_null());
    }
}
