//! Integration tests exercising the scene-graph core end to end
//!
//! Shared fixture components live here; the scenario modules group the
//! actual tests.

mod prefab_roundtrip;
mod transform_hierarchy;

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::SceneError;
use crate::scene::component::{Component, ComponentCore, ReflectComponent};
use crate::scene::handle::GameObjectHandle;
use crate::scene::object::{ComponentFlags, TransformChangedFlags};
use crate::serialization::type_registry::DecodeContext;
use crate::serialization::value::{SerializedObject, SerializedValue};

/// Shared in-order record of lifecycle events
type EventLog = Rc<RefCell<Vec<String>>>;

fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn log_entries(log: &EventLog) -> Vec<String> {
    log.borrow().clone()
}

/// Component that records every callback it receives
struct Recorder {
    core: ComponentCore,
    log: EventLog,
    tag: &'static str,
}

impl Recorder {
    fn new(tag: &'static str, log: &EventLog) -> Self {
        Self {
            core: ComponentCore::new(tag),
            log: Rc::clone(log),
            tag,
        }
    }

    fn always_run(tag: &'static str, log: &EventLog) -> Self {
        Self {
            core: ComponentCore::new(tag).with_flags(ComponentFlags::ALWAYS_RUN),
            log: Rc::clone(log),
            tag,
        }
    }

    fn notifying(tag: &'static str, log: &EventLog, notify: TransformChangedFlags) -> Self {
        Self {
            core: ComponentCore::new(tag).with_notify_flags(notify),
            log: Rc::clone(log),
            tag,
        }
    }

    fn push(&self, event: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.tag, event));
    }
}

impl Component for Recorder {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn type_key(&self) -> &'static str {
        "recorder"
    }

    fn encode(&self) -> SerializedObject {
        SerializedObject::new("recorder")
    }

    fn apply_patch(
        &mut self,
        _patch: &SerializedObject,
        _ctx: &mut DecodeContext<'_>,
    ) -> Result<(), SceneError> {
        Ok(())
    }

    fn on_created(&mut self) {
        self.push("created");
    }

    fn on_initialized(&mut self) {
        self.push("initialized");
    }

    fn on_enabled(&mut self) {
        self.push("enabled");
    }

    fn on_disabled(&mut self) {
        self.push("disabled");
    }

    fn on_destroyed(&mut self) {
        self.push("destroyed");
    }

    fn on_transform_changed(&mut self, flags: TransformChangedFlags) {
        self.push(&format!("transform:{}", flags.bits()));
    }

    fn update(&mut self, _dt: f32) {
        self.push("update");
    }

    fn fixed_update(&mut self, _dt: f32) {
        self.push("fixed_update");
    }
}

/// Data component with a handle field, decodable through the type registry
struct Spinner {
    core: ComponentCore,
    speed: f32,
    target: GameObjectHandle,
}

impl Spinner {
    fn new(speed: f32) -> Self {
        Self {
            core: ComponentCore::new("spinner"),
            speed,
            target: GameObjectHandle::null(),
        }
    }
}

impl Component for Spinner {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn encode(&self) -> SerializedObject {
        let mut data = SerializedObject::new(Self::TYPE_KEY);
        data.set("speed", SerializedValue::Float(self.speed))
            .set("target", SerializedValue::Handle(self.target.instance_id()));
        data
    }

    fn apply_patch(
        &mut self,
        patch: &SerializedObject,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(), SceneError> {
        if let Some(speed) = patch.get("speed").and_then(SerializedValue::as_float) {
            self.speed = speed;
        }
        if let Some(id) = patch.get("target").and_then(SerializedValue::as_handle) {
            self.target = ctx.handle(id);
        }
        Ok(())
    }
}

impl ReflectComponent for Spinner {
    const TYPE_KEY: &'static str = "spinner";

    fn decode(data: &SerializedObject, ctx: &mut DecodeContext<'_>) -> Result<Self, SceneError> {
        let speed = data
            .get("speed")
            .and_then(SerializedValue::as_float)
            .ok_or_else(|| SceneError::MalformedData("spinner is missing 'speed'".into()))?;
        let target = data
            .get("target")
            .and_then(SerializedValue::as_handle)
            .map_or_else(GameObjectHandle::null, |id| ctx.handle(id));
        Ok(Self {
            core: ComponentCore::new("spinner"),
            speed,
            target,
        })
    }
}
