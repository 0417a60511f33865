//! Object registry: the single source of truth for instance identity
//!
//! Every scene object and component registers here at creation. The
//! registry assigns process-unique instance ids, holds the only strong
//! references to live objects, and is the only place allowed to finalize
//! destruction. It also hosts the deserialization-session protocol used
//! to resolve cross-references inside a freshly decoded object graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use log::{debug, warn};

use super::component::Component;
use super::handle::{GameObjectHandle, InstanceData, ObjectRef};
use super::object::InstanceId;
use super::scene_object::SceneObject;

/// Strong reference to a registry-owned object
///
/// The registry is the only holder of these; everything else refers to
/// objects through weak handles.
pub enum ObjectOwner {
    /// A scene object
    SceneObject(Rc<RefCell<SceneObject>>),
    /// A component attached to a scene object
    Component(Rc<RefCell<dyn Component>>),
}

impl ObjectOwner {
    fn downgrade(&self) -> ObjectRef {
        match self {
            Self::SceneObject(rc) => ObjectRef::SceneObject(Rc::downgrade(rc)),
            Self::Component(rc) => ObjectRef::Component(Rc::downgrade(rc)),
        }
    }
}

bitflags! {
    /// How unresolved handles are matched against live objects when a
    /// deserialization session ends
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResolveMode: u32 {
        /// Translate original ids to the freshly assigned ids before lookup
        const USE_NEW_IDS = 1;
        /// Attempt to resolve ids that were not part of the decoded graph
        const RESTORE_EXTERNAL = 1 << 1;
        /// Leave a handle pointing at nothing rather than nulling it when
        /// resolution fails
        const KEEP_MISSING = 1 << 2;
        /// Force ids outside the decoded graph to resolve to null
        const BREAK_EXTERNAL = 1 << 3;
    }
}

/// Callback run when a session ends, in reverse registration order
pub type SessionCallback = Box<dyn FnOnce()>;

/// Scoped state collected while decoding a serialized object graph
///
/// Objects created during the session register under the ids they carried
/// when they were encoded ("original ids"); handle fields referencing
/// those ids are collected here and resolved in one batch at session end.
struct DeserializationSession {
    mode: ResolveMode,
    id_mapping: HashMap<InstanceId, InstanceId>,
    unresolved: Vec<(InstanceId, GameObjectHandle)>,
    unresolved_records: HashMap<InstanceId, Rc<RefCell<InstanceData>>>,
    callbacks: Vec<SessionCallback>,
}

struct RegistryEntry {
    handle: GameObjectHandle,
    owner: ObjectOwner,
}

/// Maps instance id to handle and owns every live object
pub struct ObjectRegistry {
    objects: HashMap<InstanceId, RegistryEntry>,
    next_id: InstanceId,
    queued_destroys: HashMap<InstanceId, GameObjectHandle>,
    session: Option<DeserializationSession>,
    destroyed_callbacks: Vec<Box<dyn FnMut(InstanceId)>>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
            queued_destroys: HashMap::new(),
            session: None,
            destroyed_callbacks: Vec::new(),
        }
    }

    /// Register an object and assign it the next instance id
    ///
    /// While a deserialization session is active, `original_id` must carry
    /// the id the object was encoded under. If any not-yet-resolved handle
    /// already refers to that id, its record is reused so every in-flight
    /// reference converges on one record, and the original-to-new mapping
    /// is stored for the batch resolution pass.
    ///
    /// # Panics
    ///
    /// Panics when `original_id` is non-zero outside a session, or zero
    /// inside one. Both indicate a caller bug.
    pub fn register_object(
        &mut self,
        owner: ObjectOwner,
        original_id: InstanceId,
    ) -> GameObjectHandle {
        let id = self.next_id;
        self.next_id += 1;

        let object_ref = owner.downgrade();
        let data = if let Some(session) = &mut self.session {
            assert!(
                original_id != 0,
                "objects must register with their original id during a deserialization session"
            );
            session.id_mapping.insert(original_id, id);
            if let Some(record) = session.unresolved_records.get(&original_id) {
                // Converge all in-flight references on this record
                let record = Rc::clone(record);
                {
                    let mut borrowed = record.borrow_mut();
                    borrowed.object = Some(object_ref);
                    borrowed.instance_id = id;
                }
                record
            } else {
                Rc::new(RefCell::new(InstanceData::new(Some(object_ref), id)))
            }
        } else {
            assert!(
                original_id == 0,
                "original ids are only meaningful inside a deserialization session"
            );
            Rc::new(RefCell::new(InstanceData::new(Some(object_ref), id)))
        };

        let handle = GameObjectHandle::from_data(data);
        self.objects.insert(
            id,
            RegistryEntry {
                handle: handle.clone(),
                owner,
            },
        );
        handle
    }

    /// Look up a live object, returning a null handle on miss
    pub fn get_object(&self, id: InstanceId) -> GameObjectHandle {
        self.try_get_object(id).unwrap_or_else(GameObjectHandle::null)
    }

    /// Look up a live object
    pub fn try_get_object(&self, id: InstanceId) -> Option<GameObjectHandle> {
        self.objects.get(&id).map(|entry| entry.handle.clone())
    }

    /// Number of live registered objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Enqueue an object for end-of-frame destruction
    ///
    /// Idempotent: repeated requests for the same object are deduplicated,
    /// and destroyed handles are ignored.
    pub fn queue_for_destroy(&mut self, handle: &GameObjectHandle) {
        if handle.is_destroyed() {
            debug!("ignoring destroy request for an already destroyed object");
            return;
        }
        let id = handle.instance_id();
        self.queued_destroys.entry(id).or_insert_with(|| handle.clone());
    }

    /// Number of objects waiting in the destroy queue
    pub fn queued_destroy_count(&self) -> usize {
        self.queued_destroys.len()
    }

    /// Drain the destroy queue, leaving it empty
    ///
    /// The scene manager finalizes each drained object; requests enqueued
    /// while finalizing run on the next flush.
    pub(crate) fn take_queued_destroys(&mut self) -> Vec<GameObjectHandle> {
        self.queued_destroys.drain().map(|(_, handle)| handle).collect()
    }

    /// Remove an object from the registry, firing destroyed callbacks and
    /// tombstoning its handle record
    ///
    /// This is the only path that truly removes an id; the strong
    /// reference drops here, deallocating the object.
    pub fn unregister_object(&mut self, handle: &GameObjectHandle) {
        let id = handle.instance_id();
        if self.objects.remove(&id).is_none() {
            debug!("unregister of unknown object id {id}");
            return;
        }
        self.queued_destroys.remove(&id);
        for callback in &mut self.destroyed_callbacks {
            callback(id);
        }
        if let Some(data) = handle.data() {
            data.borrow_mut().object = None;
        }
    }

    /// Subscribe to object destruction
    pub fn on_object_destroyed(&mut self, callback: impl FnMut(InstanceId) + 'static) {
        self.destroyed_callbacks.push(Box::new(callback));
    }

    /// Move an object's map entry from `old_id` to `new_id`
    ///
    /// No-op when the ids are equal.
    ///
    /// # Panics
    ///
    /// Panics if `new_id` is already occupied, which would break the
    /// one-record-per-object invariant.
    pub fn remap_id(&mut self, old_id: InstanceId, new_id: InstanceId) {
        if old_id == new_id {
            return;
        }
        let Some(entry) = self.objects.remove(&old_id) else {
            warn!("remap of unknown object id {old_id}");
            return;
        };
        assert!(
            !self.objects.contains_key(&new_id),
            "remap target id {new_id} is already registered"
        );
        if let Some(data) = entry.handle.data() {
            data.borrow_mut().instance_id = new_id;
        }
        match &entry.owner {
            ObjectOwner::SceneObject(rc) => rc.borrow_mut().set_instance_id(new_id),
            ObjectOwner::Component(rc) => {
                rc.borrow_mut().core_mut().object_mut().set_instance_id(new_id);
            }
        }
        self.objects.insert(new_id, entry);
    }

    /// Replace an object's indirection record with `record`, re-pointing
    /// every handle that shares it at this object
    ///
    /// Used when restoring identity linkage after a prefab refresh: the
    /// freshly cloned object adopts the record (and id) of the object it
    /// replaces, so stale handles track the new object.
    pub(crate) fn adopt_record(
        &mut self,
        current: &GameObjectHandle,
        record: Rc<RefCell<InstanceData>>,
        adopted_id: InstanceId,
    ) {
        let current_id = current.instance_id();
        let Some(entry) = self.objects.remove(&current_id) else {
            warn!("adopt_record on unknown object id {current_id}");
            return;
        };
        assert!(
            !self.objects.contains_key(&adopted_id),
            "adopted id {adopted_id} is already registered"
        );
        if let Some(current_record) = entry.handle.data() {
            if !Rc::ptr_eq(current_record, &record) {
                record.borrow_mut().object = current_record.borrow().object.clone();
                // Handles taken before the adoption still share the
                // object's previous record; it must report the adopted
                // identity so id-based comparisons stay coherent
                current_record.borrow_mut().instance_id = adopted_id;
            }
        }
        record.borrow_mut().instance_id = adopted_id;
        match &entry.owner {
            ObjectOwner::SceneObject(rc) => {
                let mut object = rc.borrow_mut();
                object.set_instance_id(adopted_id);
                object.replace_record(Rc::clone(&record));
            }
            ObjectOwner::Component(rc) => {
                let mut component = rc.borrow_mut();
                let core = component.core_mut().object_mut();
                core.set_instance_id(adopted_id);
                core.replace_instance_data(Rc::clone(&record), adopted_id);
            }
        }
        self.objects.insert(
            adopted_id,
            RegistryEntry {
                handle: GameObjectHandle::from_data(record),
                owner: entry.owner,
            },
        );
    }

    /// Whether a deserialization session is currently active
    pub fn deserialization_active(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a deserialization session
    ///
    /// # Panics
    ///
    /// Panics if a session is already active. Sessions are strictly
    /// non-reentrant.
    pub fn start_deserialization(&mut self, mode: ResolveMode) {
        assert!(
            self.session.is_none(),
            "a deserialization session is already active"
        );
        self.session = Some(DeserializationSession {
            mode,
            id_mapping: HashMap::new(),
            unresolved: Vec::new(),
            unresolved_records: HashMap::new(),
            callbacks: Vec::new(),
        });
    }

    /// Record a handle field referencing `original_id` for batch
    /// resolution at session end
    ///
    /// If the referenced object registers later in the same session, it
    /// reuses this handle's record so every in-flight reference converges.
    ///
    /// # Panics
    ///
    /// Panics when no session is active.
    pub fn register_unresolved_handle(&mut self, original_id: InstanceId, handle: GameObjectHandle) {
        let session = self
            .session
            .as_mut()
            .expect("no deserialization session is active");
        if let Some(record) = handle.data() {
            session
                .unresolved_records
                .entry(original_id)
                .or_insert_with(|| Rc::clone(record));
        }
        session.unresolved.push((original_id, handle));
    }

    /// Produce a handle for a decoded reference to `original_id`
    ///
    /// Fields referencing the same original id share one record, so all
    /// of them resolve together. If the session already produced the
    /// referenced object, its canonical record is shared directly.
    ///
    /// # Panics
    ///
    /// Panics when no session is active.
    pub fn session_handle(&mut self, original_id: InstanceId) -> GameObjectHandle {
        let session = self
            .session
            .as_mut()
            .expect("no deserialization session is active");
        if let Some(new_id) = session.id_mapping.get(&original_id) {
            if let Some(entry) = self.objects.get(new_id) {
                return entry.handle.clone();
            }
        }
        let record = session
            .unresolved_records
            .entry(original_id)
            .or_insert_with(|| Rc::new(RefCell::new(InstanceData::new(None, original_id))));
        let handle = GameObjectHandle::from_data(Rc::clone(record));
        session.unresolved.push((original_id, handle.clone()));
        handle
    }

    /// Register a callback to run when the session ends
    ///
    /// Callbacks run in reverse registration order.
    ///
    /// # Panics
    ///
    /// Panics when no session is active.
    pub fn register_session_callback(&mut self, callback: SessionCallback) {
        let session = self
            .session
            .as_mut()
            .expect("no deserialization session is active");
        session.callbacks.push(callback);
    }

    /// End the active session: resolve every collected handle against the
    /// current id map, run session callbacks in reverse order, then clear
    /// all session state
    ///
    /// # Panics
    ///
    /// Panics when no session is active.
    pub fn end_deserialization(&mut self) {
        let session = self
            .session
            .take()
            .expect("no deserialization session is active");

        for (original_id, handle) in &session.unresolved {
            self.resolve_unresolved(handle, *original_id, session.mode, &session.id_mapping);
        }
        for callback in session.callbacks.into_iter().rev() {
            callback();
        }
    }

    fn resolve_unresolved(
        &self,
        handle: &GameObjectHandle,
        original_id: InstanceId,
        mode: ResolveMode,
        id_mapping: &HashMap<InstanceId, InstanceId>,
    ) {
        let Some(data) = handle.data() else {
            return;
        };

        let is_internal = id_mapping.contains_key(&original_id);
        let target_id = if is_internal && mode.contains(ResolveMode::USE_NEW_IDS) {
            id_mapping[&original_id]
        } else {
            original_id
        };

        let force_break = !is_internal && mode.contains(ResolveMode::BREAK_EXTERNAL);
        let lookup_allowed = is_internal || mode.contains(ResolveMode::RESTORE_EXTERNAL);
        let entry = if force_break || !lookup_allowed {
            None
        } else {
            self.objects.get(&target_id)
        };

        match entry {
            Some(found) => {
                let object = found
                    .handle
                    .data()
                    .and_then(|found_data| found_data.borrow().object.clone());
                let mut borrowed = data.borrow_mut();
                borrowed.object = object;
                borrowed.instance_id = target_id;
            }
            None if !force_break && mode.contains(ResolveMode::KEEP_MISSING) => {
                // Left pointing at nothing, keeping the original id
            }
            None => {
                let mut borrowed = data.borrow_mut();
                borrowed.object = None;
                borrowed.instance_id = 0;
            }
        }
    }
}
