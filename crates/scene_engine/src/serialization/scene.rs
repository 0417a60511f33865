//! Scene-object codec over the intermediate representation
//!
//! Encodes a scene-object subtree into the opaque field tree and rebuilds
//! it under an active deserialization session. Decoded objects register
//! with the ids they were encoded under, so cross-references resolve in
//! the session's batch pass. Decoded hierarchies are always inert; the
//! caller decides when to instantiate them.

use std::rc::Rc;

use crate::core::error::SceneError;
use crate::scene::component::Component;
use crate::scene::handle::{ComponentHandle, SceneObjectHandle};
use crate::scene::object::{LinkId, Mobility, SceneObjectFlags, TransformChangedFlags};
use crate::scene::object::ComponentFlags;
use crate::scene::registry::ObjectOwner;
use crate::scene::scene_manager::SceneContext;
use crate::scene::scene_object::SceneObject;

use super::type_registry::DecodeContext;
use super::value::{SerializedObject, SerializedValue};

const TYPE_SCENE_OBJECT: &str = "scene_object";
const TYPE_COMPONENT: &str = "component";

/// Encode a scene-object subtree, components included
///
/// Instance ids ride along as the "original ids" the decoder registers
/// under. A dead handle encodes as an empty tree.
pub(crate) fn encode_scene_object(handle: &SceneObjectHandle) -> SerializedObject {
    let mut encoded = SerializedObject::new(TYPE_SCENE_OBJECT);
    let Some(rc) = handle.resolve() else {
        return encoded;
    };

    {
        let object = rc.borrow();
        let local = object.local_transform();
        encoded
            .set("id", SerializedValue::UInt(object.core().instance_id()))
            .set(
                "name",
                SerializedValue::String(object.core().name().to_string()),
            )
            .set(
                "link_id",
                SerializedValue::UInt(u64::from(object.core().link_id())),
            )
            .set("active_self", SerializedValue::Bool(object.active_self()))
            .set(
                "mobility",
                SerializedValue::UInt(u64::from(object.mobility().to_raw())),
            )
            .set(
                "flags",
                SerializedValue::UInt(u64::from(object.flags().bits())),
            )
            .set("translation", SerializedValue::vec3(local.position))
            .set("rotation", SerializedValue::quat(local.rotation))
            .set("scale", SerializedValue::vec3(local.scale))
            .set(
                "prefab_hash",
                SerializedValue::UInt(u64::from(object.prefab_hash())),
            );
        if let Some(link) = object.prefab_link() {
            encoded.set("prefab_link", SerializedValue::Uuid(link));
        }
    }

    let components = handle
        .components()
        .iter()
        .map(|component| SerializedValue::Object(encode_component(component)))
        .collect();
    encoded.set("components", SerializedValue::Array(components));

    let children = handle
        .children()
        .iter()
        .map(|child| SerializedValue::Object(encode_scene_object(child)))
        .collect();
    encoded.set("children", SerializedValue::Array(children));

    encoded
}

/// Encode a component with its wrapper metadata and field payload
pub(crate) fn encode_component(handle: &ComponentHandle) -> SerializedObject {
    let mut encoded = SerializedObject::new(TYPE_COMPONENT);
    let Some(rc) = handle.resolve() else {
        return encoded;
    };
    let component = rc.borrow();
    let core = component.core();
    encoded
        .set("id", SerializedValue::UInt(core.object().instance_id()))
        .set(
            "type",
            SerializedValue::String(component.type_key().to_string()),
        )
        .set(
            "name",
            SerializedValue::String(core.object().name().to_string()),
        )
        .set(
            "link_id",
            SerializedValue::UInt(u64::from(core.object().link_id())),
        )
        .set("flags", SerializedValue::UInt(u64::from(core.flags().bits())))
        .set(
            "notify",
            SerializedValue::UInt(u64::from(core.notify_flags().bits())),
        )
        .set("data", SerializedValue::Object(component.encode()));
    encoded
}

fn require_uint(data: &SerializedObject, field: &str) -> Result<u64, SceneError> {
    data.get(field)
        .and_then(SerializedValue::as_uint)
        .ok_or_else(|| SceneError::MalformedData(format!("missing field '{field}'")))
}

fn require_str<'a>(data: &'a SerializedObject, field: &str) -> Result<&'a str, SceneError> {
    data.get(field)
        .and_then(SerializedValue::as_str)
        .ok_or_else(|| SceneError::MalformedData(format!("missing field '{field}'")))
}

/// Rebuild a scene-object subtree from its encoded form
///
/// The result is detached, inert and registered under fresh instance ids.
///
/// # Errors
///
/// Returns an error when required fields are missing or a component type
/// was never registered.
///
/// # Panics
///
/// Panics when no deserialization session is active; decoding outside a
/// session is a caller bug.
pub(crate) fn decode_scene_object(
    ctx: &Rc<SceneContext>,
    data: &SerializedObject,
) -> Result<SceneObjectHandle, SceneError> {
    assert!(
        ctx.registry.borrow().deserialization_active(),
        "scene decoding requires an active deserialization session"
    );
    let handle = decode_node(ctx, data)?;
    // Derive hierarchy activation for the whole decoded subtree
    handle.set_active_hierarchy_internal(true, false);
    Ok(handle)
}

fn decode_node(
    ctx: &Rc<SceneContext>,
    data: &SerializedObject,
) -> Result<SceneObjectHandle, SceneError> {
    let original_id = require_uint(data, "id")?;
    let name = require_str(data, "name")?;
    let flags = SceneObjectFlags::from_bits_truncate(
        u32::try_from(require_uint(data, "flags")?).unwrap_or(0),
    );

    let handle = SceneObject::create_internal(ctx, name, flags, original_id);
    if let Some(rc) = handle.resolve() {
        let mut object = rc.borrow_mut();
        let translation = data
            .get("translation")
            .and_then(SerializedValue::as_vec3)
            .ok_or_else(|| SceneError::MalformedData("missing field 'translation'".into()))?;
        let rotation = data
            .get("rotation")
            .and_then(SerializedValue::as_quat)
            .ok_or_else(|| SceneError::MalformedData("missing field 'rotation'".into()))?;
        let scale = data
            .get("scale")
            .and_then(SerializedValue::as_vec3)
            .ok_or_else(|| SceneError::MalformedData("missing field 'scale'".into()))?;
        object.set_local_parts(translation, rotation, scale);

        let link_id = LinkId::try_from(require_uint(data, "link_id")?)
            .map_err(|_| SceneError::MalformedData("link_id out of range".into()))?;
        object.set_link_id(link_id);
        object.set_mobility_silent(Mobility::from_raw(
            u8::try_from(require_uint(data, "mobility")?).unwrap_or(0),
        ));
        object.set_active_silent(
            data.get("active_self")
                .and_then(SerializedValue::as_bool)
                .unwrap_or(true),
        );
        object.set_prefab_hash(
            u32::try_from(require_uint(data, "prefab_hash").unwrap_or(0)).unwrap_or(0),
        );
        object.set_prefab_link(data.get("prefab_link").and_then(SerializedValue::as_uuid));
    }

    if let Some(SerializedValue::Array(components)) = data.get("components") {
        for entry in components {
            let wrapper = entry
                .as_object()
                .ok_or_else(|| SceneError::MalformedData("component entry is not an object".into()))?;
            decode_component_into(ctx, &handle, wrapper)?;
        }
    }

    if let Some(SerializedValue::Array(children)) = data.get("children") {
        for entry in children {
            let child_data = entry
                .as_object()
                .ok_or_else(|| SceneError::MalformedData("child entry is not an object".into()))?;
            let child = decode_node(ctx, child_data)?;
            handle.attach_child_internal(&child);
        }
    }

    Ok(handle)
}

/// Rebuild one component from its wrapper form and attach it to `owner`
///
/// The component is appended at the end of the owner's component list and
/// is not announced to the scene manager.
///
/// # Errors
///
/// Returns an error on malformed data or an unregistered component type.
pub(crate) fn decode_component_into(
    ctx: &Rc<SceneContext>,
    owner: &SceneObjectHandle,
    wrapper: &SerializedObject,
) -> Result<ComponentHandle, SceneError> {
    let original_id = require_uint(wrapper, "id")?;
    let type_key = require_str(wrapper, "type")?;
    let payload = wrapper
        .get("data")
        .and_then(SerializedValue::as_object)
        .ok_or_else(|| SceneError::MalformedData("component entry has no data payload".into()))?;

    let component: Rc<std::cell::RefCell<dyn Component>> = {
        let types = ctx.types.borrow();
        let mut registry = ctx.registry.borrow_mut();
        let mut decode_ctx = DecodeContext::new(&mut registry);
        types.decode(type_key, payload, &mut decode_ctx)?
    };

    let handle = ctx
        .registry
        .borrow_mut()
        .register_object(ObjectOwner::Component(Rc::clone(&component)), original_id);
    {
        let mut borrowed = component.borrow_mut();
        let core = borrowed.core_mut();
        core.attach(&handle, owner.clone(), Rc::downgrade(ctx));
        core.object_mut().set_name(require_str(wrapper, "name")?);
        core.object_mut().set_link_id(
            LinkId::try_from(require_uint(wrapper, "link_id")?)
                .map_err(|_| SceneError::MalformedData("link_id out of range".into()))?,
        );
        core.set_flags(ComponentFlags::from_bits_truncate(
            u32::try_from(require_uint(wrapper, "flags")?).unwrap_or(0),
        ));
        core.set_notify_flags(TransformChangedFlags::from_bits_truncate(
            u32::try_from(require_uint(wrapper, "notify")?).unwrap_or(0),
        ));
    }

    let component_handle = ComponentHandle::from(handle);
    if let Some(owner_rc) = owner.resolve() {
        owner_rc.borrow_mut().push_component(component_handle.clone());
    }
    Ok(component_handle)
}
