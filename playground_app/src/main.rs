//! Scene playground
//!
//! Exercises the scene-graph core end to end: builds a small object
//! hierarchy, captures it as a prefab, stamps out instances, records an
//! instance override, advances the template and refreshes the instances,
//! then drives the update loop for a few simulated frames.

use log::info;
use scene_engine::prelude::*;

const FRAME_DT: f32 = 1.0 / 60.0;

/// Rotates its owner around the local Y axis every frame
struct Spinner {
    core: ComponentCore,
    speed: f32,
}

impl Spinner {
    fn new(speed: f32) -> Self {
        Self {
            core: ComponentCore::new("spinner"),
            speed,
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
        data.set("speed", SerializedValue::Float(self.speed));
        data
    }

    fn apply_patch(
        &mut self,
        patch: &SerializedObject,
        _ctx: &mut DecodeContext<'_>,
    ) -> Result<(), SceneError> {
        if let Some(speed) = patch.get("speed").and_then(SerializedValue::as_float) {
            self.speed = speed;
        }
        Ok(())
    }

    fn update(&mut self, dt: f32) {
        let owner = self.core.owner().clone();
        owner.yaw(self.speed * dt);
    }
}

impl ReflectComponent for Spinner {
    const TYPE_KEY: &'static str = "spinner";

    fn decode(data: &SerializedObject, _ctx: &mut DecodeContext<'_>) -> Result<Self, SceneError> {
        let speed = data
            .get("speed")
            .and_then(SerializedValue::as_float)
            .ok_or_else(|| SceneError::MalformedData("spinner is missing 'speed'".into()))?;
        Ok(Self::new(speed))
    }
}

/// Turns its owner toward a target object each fixed step
struct Tracker {
    core: ComponentCore,
    target: GameObjectHandle,
}

impl Tracker {
    fn new() -> Self {
        Self {
            core: ComponentCore::new("tracker"),
            target: GameObjectHandle::null(),
        }
    }
}

impl Component for Tracker {
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
        data.set("target", SerializedValue::Handle(self.target.instance_id()));
        data
    }

    fn apply_patch(
        &mut self,
        patch: &SerializedObject,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(), SceneError> {
        if let Some(id) = patch.get("target").and_then(SerializedValue::as_handle) {
            self.target = ctx.handle(id);
        }
        Ok(())
    }

    fn fixed_update(&mut self, _dt: f32) {
        let Some(target) = self.target.scene_object() else {
            return;
        };
        let target_position = target.borrow().local_transform().position;
        let owner = self.core.owner().clone();
        owner.look_at(target_position, Vec3::new(0.0, 1.0, 0.0));
    }
}

impl ReflectComponent for Tracker {
    const TYPE_KEY: &'static str = "tracker";

    fn decode(data: &SerializedObject, ctx: &mut DecodeContext<'_>) -> Result<Self, SceneError> {
        let target = data
            .get("target")
            .and_then(SerializedValue::as_handle)
            .map_or_else(GameObjectHandle::null, |id| ctx.handle(id));
        Ok(Self {
            core: ComponentCore::new("tracker"),
            target,
        })
    }
}

/// Author the turret template: a base with a spinning barrel
fn build_turret(scene: &SceneManager) -> SceneObjectHandle {
    let base = scene.create_object("turret", SceneObjectFlags::empty());
    let barrel = scene.create_object("barrel", SceneObjectFlags::empty());
    barrel.set_parent(&base, false);
    barrel.set_translation(Vec3::new(0.0, 0.5, 0.0));
    barrel.add_component(Spinner::new(1.0));
    barrel.add_component(Tracker::new());
    base
}

fn main() {
    scene_engine::foundation::logging::init();

    let config = SceneConfig::from_file("scene.toml").unwrap_or_else(|err| {
        info!("no scene.toml ({err}), using defaults");
        SceneConfig::default()
    });
    let scene = SceneManager::with_config(config);
    scene.register_component_type::<Spinner>();
    scene.register_component_type::<Tracker>();

    // Something for the trackers to aim at
    let beacon = scene.create_object("beacon", SceneObjectFlags::empty());
    beacon.set_translation(Vec3::new(0.0, 3.0, 8.0));

    // Capture the authored hierarchy as a template
    let template = build_turret(&scene);
    let resources = ResourceManager::new();
    let resource = match Prefab::create(&template, false) {
        Some(prefab) => resources.add(prefab),
        None => {
            log::error!("failed to capture the turret template");
            return;
        }
    };
    info!("captured turret prefab {}", resource.uuid());

    // Stamp out a row of instances aimed at the beacon
    let mut instances = Vec::new();
    for index in 0..3 {
        let prefab = resource.get().expect("prefab is resident");
        let instance = prefab.borrow().instantiate(&resources);
        instance.set_parent(&scene.root(), false);
        instance.set_name(&format!("turret {index}"));
        instance.set_translation(Vec3::new(index as f32 * 4.0 - 4.0, 0.0, 0.0));
        for component in instance.child(0).components() {
            let _ = component.with_mut::<Tracker, _>(|tracker| {
                tracker.target = beacon.as_game_object().clone();
            });
        }
        instances.push(instance);
    }

    scene.set_state(RunState::Running);
    let fixed_dt = scene.config().fixed_time_step;
    let mut fixed_accumulator = 0.0;
    for _frame in 0..120 {
        scene.update(FRAME_DT);
        fixed_accumulator += FRAME_DT;
        while fixed_accumulator >= fixed_dt {
            scene.fixed_update(fixed_dt);
            fixed_accumulator -= fixed_dt;
        }
    }
    let stats = scene.stats();
    info!(
        "after 2 simulated seconds: {} active components, {} updates dispatched",
        stats.active_components, stats.updates_dispatched
    );

    // Override one instance, then advance the template and refresh
    let east = &instances[2];
    east.set_name("turret east");
    east.child(0).components()[0]
        .with_mut::<Spinner, _>(|spinner| spinner.speed = 3.0)
        .unwrap_or_else(|| log::warn!("east turret has no spinner"));
    for instance in &instances {
        PrefabUtility::record_prefab_diff(&resources, instance);
    }

    template.child(0).components()[0]
        .with_mut::<Spinner, _>(|spinner| spinner.speed = 2.0)
        .unwrap_or_else(|| log::warn!("template has no spinner"));
    if let Some(prefab) = resource.get() {
        prefab.borrow_mut().update(&template);
    }
    for instance in &instances {
        PrefabUtility::update_from_prefab(&resources, instance);
    }
    info!(
        "refreshed instances to prefab hash {}; east turret kept its override: {}",
        instances[0].prefab_hash(),
        instances[2].name()
    );

    for _frame in 0..60 {
        scene.update(FRAME_DT);
    }

    scene.set_state(RunState::Stopped);
    let tracked = scene.registry_mut().object_count();
    info!("playground finished: {tracked} objects tracked");
}
