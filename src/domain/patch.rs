//! JSON merge patch
//!
//! RFC 7386 semantics: object members merge recursively, `null` removes a
//! member, any non-object patch value replaces the target wholesale.

use serde_json::{Map, Value};

/// Apply `patch` to `target` in place
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        merge_into_map(target_map, patch_map);
    }
}

/// Apply an object patch to an object state
pub fn merge_into_map(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
            continue;
        }
        match target.get_mut(key) {
            Some(existing) if value.is_object() => merge_patch(existing, value),
            _ => {
                let mut fresh = Value::Null;
                merge_patch(&mut fresh, value);
                target.insert(key.clone(), fresh);
            }
        }
    }
}
