//! Weak, resolvable references to registry-tracked objects
//!
//! A handle never owns its target. It wraps a shared indirection record
//! ([`InstanceData`]); many handles may share one record, so re-pointing
//! the record re-targets every handle at once. The registry keeps the only
//! strong references to live objects and is the only place that drops
//! them, so a handle observes destruction as a tombstoned record or a
//! dangling weak reference.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::component::Component;
use super::object::InstanceId;
use super::scene_object::SceneObject;

/// Weak reference to either kind of registry-tracked object
#[derive(Clone)]
pub enum ObjectRef {
    /// A scene object
    SceneObject(Weak<RefCell<SceneObject>>),
    /// A component attached to a scene object
    Component(Weak<RefCell<dyn Component>>),
}

impl ObjectRef {
    /// Whether the referenced allocation is still live
    pub fn is_alive(&self) -> bool {
        match self {
            Self::SceneObject(weak) => weak.strong_count() > 0,
            Self::Component(weak) => weak.strong_count() > 0,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SceneObject(_) => write!(f, "ObjectRef::SceneObject"),
            Self::Component(_) => write!(f, "ObjectRef::Component"),
        }
    }
}

/// Indirection record shared by every handle pointing at one object
///
/// Invariant: no two distinct live objects share the same record. The
/// record is only re-pointed through the registry's remap and restore
/// operations, never by arbitrary call sites.
#[derive(Debug)]
pub struct InstanceData {
    pub(crate) object: Option<ObjectRef>,
    pub(crate) instance_id: InstanceId,
}

impl InstanceData {
    pub(crate) fn new(object: Option<ObjectRef>, instance_id: InstanceId) -> Self {
        Self {
            object,
            instance_id,
        }
    }
}

/// Weak reference to any registry-tracked object
///
/// Equality compares target identity: two handles are equal when they
/// refer to the same live instance id, or share the same record.
#[derive(Clone, Default)]
pub struct GameObjectHandle {
    data: Option<Rc<RefCell<InstanceData>>>,
}

impl GameObjectHandle {
    /// A handle pointing at nothing
    pub fn null() -> Self {
        Self { data: None }
    }

    /// Whether this handle was ever attached to a record
    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    pub(crate) fn from_data(data: Rc<RefCell<InstanceData>>) -> Self {
        Self { data: Some(data) }
    }

    pub(crate) fn data(&self) -> Option<&Rc<RefCell<InstanceData>>> {
        self.data.as_ref()
    }

    /// Instance id of the target, 0 for a null handle
    pub fn instance_id(&self) -> InstanceId {
        self.data
            .as_ref()
            .map_or(0, |data| data.borrow().instance_id)
    }

    /// Whether the target is gone: a null handle, a tombstoned record, or
    /// a record whose object has been deallocated
    pub fn is_destroyed(&self) -> bool {
        match &self.data {
            None => true,
            Some(data) => match &data.borrow().object {
                None => true,
                Some(object) => !object.is_alive(),
            },
        }
    }

    /// Resolve to a live scene object, `None` on miss or kind mismatch
    pub fn scene_object(&self) -> Option<Rc<RefCell<SceneObject>>> {
        match &self.data.as_ref()?.borrow().object {
            Some(ObjectRef::SceneObject(weak)) => weak.upgrade(),
            _ => None,
        }
    }

    /// Resolve to a live component, `None` on miss or kind mismatch
    pub fn component(&self) -> Option<Rc<RefCell<dyn Component>>> {
        match &self.data.as_ref()?.borrow().object {
            Some(ObjectRef::Component(weak)) => weak.upgrade(),
            _ => None,
        }
    }
}

impl PartialEq for GameObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                Rc::ptr_eq(a, b)
                    || (!self.is_destroyed()
                        && !other.is_destroyed()
                        && self.instance_id() == other.instance_id())
            }
            _ => false,
        }
    }
}

impl Eq for GameObjectHandle {}

impl fmt::Debug for GameObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "GameObjectHandle(null)")
        } else if self.is_destroyed() {
            write!(f, "GameObjectHandle({}, destroyed)", self.instance_id())
        } else {
            write!(f, "GameObjectHandle({})", self.instance_id())
        }
    }
}

/// Typed handle to a scene object
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SceneObjectHandle(pub(crate) GameObjectHandle);

impl SceneObjectHandle {
    /// A handle pointing at nothing
    pub fn null() -> Self {
        Self(GameObjectHandle::null())
    }

    /// Whether this handle was ever attached to a record
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Whether the target scene object is gone
    pub fn is_destroyed(&self) -> bool {
        self.0.is_destroyed() || self.resolve().is_none()
    }

    /// Instance id of the target, 0 for a null handle
    pub fn instance_id(&self) -> InstanceId {
        self.0.instance_id()
    }

    /// The untyped handle sharing the same record
    pub fn as_game_object(&self) -> &GameObjectHandle {
        &self.0
    }

    /// Resolve to the live scene object
    pub fn resolve(&self) -> Option<Rc<RefCell<SceneObject>>> {
        self.0.scene_object()
    }
}

impl From<GameObjectHandle> for SceneObjectHandle {
    fn from(handle: GameObjectHandle) -> Self {
        Self(handle)
    }
}

impl fmt::Debug for SceneObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneObjectHandle({})", self.instance_id())
    }
}

/// Typed handle to a component
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ComponentHandle(pub(crate) GameObjectHandle);

impl ComponentHandle {
    /// A handle pointing at nothing
    pub fn null() -> Self {
        Self(GameObjectHandle::null())
    }

    /// Whether this handle was ever attached to a record
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Whether the target component is gone
    pub fn is_destroyed(&self) -> bool {
        self.0.is_destroyed() || self.resolve().is_none()
    }

    /// Instance id of the target, 0 for a null handle
    pub fn instance_id(&self) -> InstanceId {
        self.0.instance_id()
    }

    /// The untyped handle sharing the same record
    pub fn as_game_object(&self) -> &GameObjectHandle {
        &self.0
    }

    /// Resolve to the live component
    pub fn resolve(&self) -> Option<Rc<RefCell<dyn Component>>> {
        self.0.component()
    }
}

impl From<GameObjectHandle> for ComponentHandle {
    fn from(handle: GameObjectHandle) -> Self {
        Self(handle)
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentHandle({})", self.instance_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        let handle = GameObjectHandle::null();
        assert!(handle.is_null());
        assert!(handle.is_destroyed());
        assert_eq!(handle.instance_id(), 0);
        assert!(handle.scene_object().is_none());
        assert!(handle.component().is_none());
    }

    #[test]
    fn test_shared_record_retargets_every_handle() {
        let record = Rc::new(RefCell::new(InstanceData::new(None, 7)));
        let a = GameObjectHandle::from_data(Rc::clone(&record));
        let b = GameObjectHandle::from_data(Rc::clone(&record));

        assert_eq!(a.instance_id(), 7);
        assert_eq!(b.instance_id(), 7);

        record.borrow_mut().instance_id = 42;
        assert_eq!(a.instance_id(), 42);
        assert_eq!(b.instance_id(), 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tombstoned_record_reads_as_destroyed() {
        let record = Rc::new(RefCell::new(InstanceData::new(None, 3)));
        let handle = GameObjectHandle::from_data(record);
        assert!(!handle.is_null());
        assert!(handle.is_destroyed());
    }
}
