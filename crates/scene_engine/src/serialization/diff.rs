//! Generic field-level diffing over the intermediate representation
//!
//! Produces the partial trees the prefab machinery records for components
//! that exist in both the template and the instance. A diff only contains
//! fields whose values differ; absent fields mean "unchanged".

use super::value::{SerializedObject, SerializedValue};

/// Compute the fields of `b` that differ from `a`
///
/// Nested objects are diffed recursively and appear in the result only if
/// something inside them changed. Arrays are treated as atomic values: any
/// difference records the whole array from `b`. Fields present only in `b`
/// are recorded; fields present only in `a` are ignored, since both sides
/// are expected to come from the same reflective type.
///
/// Returns `None` when nothing differs.
pub fn generate_diff(a: &SerializedObject, b: &SerializedObject) -> Option<SerializedObject> {
    let mut diff = SerializedObject::new(b.type_key.clone());

    for (name, b_value) in &b.fields {
        match a.get(name) {
            Some(a_value) if a_value == b_value => {}
            Some(SerializedValue::Object(a_nested)) => {
                if let SerializedValue::Object(b_nested) = b_value {
                    if let Some(nested_diff) = generate_diff(a_nested, b_nested) {
                        diff.set(name.clone(), SerializedValue::Object(nested_diff));
                    }
                } else {
                    diff.set(name.clone(), b_value.clone());
                }
            }
            _ => {
                diff.set(name.clone(), b_value.clone());
            }
        }
    }

    if diff.is_empty() {
        None
    } else {
        Some(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(speed: f32, name: &str) -> SerializedObject {
        let mut object = SerializedObject::new("spinner");
        object
            .set("speed", SerializedValue::Float(speed))
            .set("label", SerializedValue::String(name.to_string()));
        object
    }

    #[test]
    fn test_identical_objects_yield_none() {
        assert!(generate_diff(&sample(1.0, "a"), &sample(1.0, "a")).is_none());
    }

    #[test]
    fn test_only_changed_fields_recorded() {
        let diff = generate_diff(&sample(1.0, "a"), &sample(2.0, "a")).unwrap();
        assert_eq!(diff.fields.len(), 1);
        assert_eq!(
            diff.get("speed").and_then(SerializedValue::as_float),
            Some(2.0)
        );
    }

    #[test]
    fn test_nested_object_diff_propagates_none() {
        let mut a = SerializedObject::new("outer");
        a.set("inner", SerializedValue::Object(sample(1.0, "a")));
        let mut b = SerializedObject::new("outer");
        b.set("inner", SerializedValue::Object(sample(1.0, "a")));

        assert!(generate_diff(&a, &b).is_none());

        let mut c = SerializedObject::new("outer");
        c.set("inner", SerializedValue::Object(sample(3.0, "a")));
        let diff = generate_diff(&a, &c).unwrap();
        let inner = diff.get("inner").and_then(SerializedValue::as_object).unwrap();
        assert_eq!(inner.fields.len(), 1);
        assert!(inner.get("speed").is_some());
    }

    #[test]
    fn test_field_only_in_b_recorded() {
        let a = sample(1.0, "a");
        let mut b = sample(1.0, "a");
        b.set("extra", SerializedValue::Bool(true));

        let diff = generate_diff(&a, &b).unwrap();
        assert_eq!(diff.fields.len(), 1);
        assert!(diff.get("extra").is_some());
    }
}
