//! Event reducers
//!
//! How each event changes projected state. `create` and `patch` events
//! have fixed semantics; `append` events go through a reducer registered
//! for their event type, or a shallow merge when none is registered.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::{merge_patch, Event, EventKind};

/// Type-specific reducer: folds one payload into the state object.
/// Must be deterministic (no clock, no randomness).
pub type Reducer = Arc<dyn Fn(&mut Map<String, Value>, &Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ReducerRegistry {
    reducers: HashMap<String, Reducer>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the reducer for an event type, replacing any previous one
    pub fn register<F>(&mut self, event_type: impl Into<String>, reducer: F) -> &mut Self
    where
        F: Fn(&mut Map<String, Value>, &Value) + Send + Sync + 'static,
    {
        self.reducers.insert(event_type.into(), Arc::new(reducer));
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.reducers.contains_key(event_type)
    }

    /// Apply one event to the state
    pub fn apply(&self, state: &mut Value, event: &Event) {
        match event.kind {
            EventKind::Create => {
                *state = match &event.payload {
                    Value::Object(_) => event.payload.clone(),
                    _ => Value::Object(Map::new()),
                };
            }
            EventKind::Patch => merge_patch(state, &event.payload),
            EventKind::Append => {
                if !state.is_object() {
                    *state = Value::Object(Map::new());
                }
                let Value::Object(map) = state else {
                    return;
                };
                match self.reducers.get(&event.event_type) {
                    Some(reducer) => reducer(map, &event.payload),
                    None => shallow_merge(map, &event.payload),
                }
            }
        }
    }
}

impl std::fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.reducers.keys().collect();
        types.sort();
        f.debug_struct("ReducerRegistry")
            .field("event_types", &types)
            .finish()
    }
}

/// Overwrite top-level members with the payload's
fn shallow_merge(state: &mut Map<String, Value>, payload: &Value) {
    if let Value::Object(members) = payload {
        for (key, value) in members {
            state.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Digest, EventMetadata};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, kind: EventKind, payload: Value) -> Event {
        Event {
            aggregate_type: "order".to_string(),
            aggregate_id: "A1".to_string(),
            event_type: event_type.to_string(),
            kind,
            sequence_number: 1,
            payload,
            prior_hash: Digest::GENESIS,
            own_hash: Digest::GENESIS,
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                created_at: Utc::now(),
                note: None,
                attributes: None,
            },
        }
    }

    #[test]
    fn test_create_replaces_state() {
        let registry = ReducerRegistry::new();
        let mut state = json!({ "old": true });
        registry.apply(&mut state, &event("Created", EventKind::Create, json!({ "total": 10 })));
        assert_eq!(state, json!({ "total": 10 }));
    }

    #[test]
    fn test_patch_merges() {
        let registry = ReducerRegistry::new();
        let mut state = json!({ "total": 10, "customer": { "name": "Ann", "tier": "gold" } });
        registry.apply(
            &mut state,
            &event(
                "Updated",
                EventKind::Patch,
                json!({ "customer": { "tier": null }, "status": "open" }),
            ),
        );
        assert_eq!(
            state,
            json!({ "total": 10, "customer": { "name": "Ann" }, "status": "open" })
        );
    }

    #[test]
    fn test_append_without_reducer_is_shallow_merge() {
        let registry = ReducerRegistry::new();
        let mut state = json!({ "total": 10, "customer": { "name": "Ann" } });
        registry.apply(
            &mut state,
            &event("ItemAdded", EventKind::Append, json!({ "sku": "X", "customer": {} })),
        );
        assert_eq!(state, json!({ "total": 10, "sku": "X", "customer": {} }));
    }

    #[test]
    fn test_registered_reducer_is_used() {
        let mut registry = ReducerRegistry::new();
        registry.register("ItemAdded", |state, payload| {
            let items = state
                .entry("items")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = items {
                items.push(payload["sku"].clone());
            }
        });
        assert!(registry.contains("ItemAdded"));

        let mut state = json!({});
        registry.apply(&mut state, &event("ItemAdded", EventKind::Append, json!({ "sku": "X" })));
        registry.apply(&mut state, &event("ItemAdded", EventKind::Append, json!({ "sku": "Y" })));
        assert_eq!(state, json!({ "items": ["X", "Y"] }));
    }
}
