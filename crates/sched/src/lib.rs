//! Corral scheduling: pinned-node resolution and the state annotation codec.
//!
//! A workload pinned to a node carries the internal node name in
//! `scheduling.node.nodeId`; the identifier the user originally supplied is
//! kept in a JSON map stored under the `workload.cattle.io/state` annotation,
//! keyed by [`state_key`] of the node name.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use corral_core::values::{self, Document};
use corral_core::{NodeLookup, STATE_ANNOTATION};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

const NODE_ID_PATH: [&str; 3] = ["scheduling", "node", "nodeId"];

/// Derived key -> original node identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulingState(BTreeMap<String, String>);

impl SchedulingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, node_id: String) -> Option<String> {
        self.0.insert(key, node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Original identifier recorded for an internal node name.
    pub fn node_id_for(&self, node_name: &str) -> Option<&str> {
        self.get(&state_key(node_name))
    }
}

/// State key for an internal node name (URL-safe base64).
pub fn state_key(node_name: &str) -> String {
    URL_SAFE.encode(node_name.as_bytes())
}

/// Inverse of [`state_key`]; `None` for keys that are not valid UTF-8 base64.
pub fn node_name_from_key(key: &str) -> Option<String> {
    let bytes = URL_SAFE.decode(key).ok()?;
    String::from_utf8(bytes).ok()
}

/// Read the state annotation. Missing or malformed state decodes as empty.
pub fn decode_state(data: &Document) -> SchedulingState {
    let raw = values::get_string(data, &["annotations", STATE_ANNOTATION]);
    if raw.is_empty() {
        return SchedulingState::new();
    }
    match serde_json::from_str(&raw) {
        Ok(state) => state,
        Err(e) => {
            debug!(error = %e, "malformed scheduling state; starting empty");
            SchedulingState::new()
        }
    }
}

/// Write the state annotation. On failure the annotation is left as it was.
pub fn encode_state(data: &mut Document, state: &SchedulingState) {
    match serde_json::to_string(state) {
        Ok(content) => values::put_value(data, Value::String(content), &["annotations", STATE_ANNOTATION]),
        Err(e) => {
            error!(id = %values::get_string(data, &["id"]), error = %e, "failed to save state on workload");
        }
    }
}

/// Resolve a pinned node and record the user's identifier in the state.
///
/// Without a pinned node the top-level `nodeId` is cleared. A node that cannot
/// be resolved leaves the document untouched.
pub async fn set_scheduling(data: &mut Document, nodes: &dyn NodeLookup) {
    let node_id = values::get_string(data, &NODE_ID_PATH);
    if node_id.is_empty() {
        values::put_value(data, Value::String(String::new()), &["nodeId"]);
        return;
    }

    let node_name = match nodes.resolve_node_name(&node_id).await {
        Ok(name) => name,
        Err(e) => {
            counter!("node_lookup_err_total", 1u64);
            warn!(node_id = %node_id, error = %e, "node lookup failed");
            String::new()
        }
    };
    if node_name.is_empty() {
        warn!(node_id = %node_id, "pinned node not resolved; scheduling left as submitted");
        return;
    }

    values::put_value(data, Value::String(node_name.clone()), &NODE_ID_PATH);
    let mut state = decode_state(data);
    state.insert(state_key(&node_name), node_id.clone());
    encode_state(data, &state);
    info!(node_id = %node_id, node = %node_name, "sched: pinned node resolved");
}

/// Put the user's original node identifier back in `scheduling.node.nodeId`.
/// Returns whether a replacement happened.
pub fn restore_node_id(data: &mut Document) -> bool {
    let node_name = values::get_string(data, &NODE_ID_PATH);
    if node_name.is_empty() {
        return false;
    }
    let state = decode_state(data);
    match state.node_id_for(&node_name) {
        Some(node_id) => {
            values::put_value(data, Value::String(node_id.to_string()), &NODE_ID_PATH);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Nodes(HashMap<String, String>);

    #[async_trait::async_trait]
    impl NodeLookup for Nodes {
        async fn resolve_node_name(&self, node_id: &str) -> anyhow::Result<String> {
            self.0
                .get(node_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("node {} not found", node_id))
        }
    }

    fn nodes() -> Nodes {
        Nodes(HashMap::from([("c-abc:m-123".to_string(), "worker-1".to_string())]))
    }

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn state_keys_round_trip_node_names() {
        let key = state_key("worker-1.example.com");
        assert!(!key.contains('/') && !key.contains('+'));
        assert_eq!(node_name_from_key(&key).as_deref(), Some("worker-1.example.com"));
        assert_eq!(node_name_from_key("%%%"), None);
    }

    #[test]
    fn malformed_state_decodes_empty() {
        let d = doc(json!({ "annotations": { "workload.cattle.io/state": "{not json" } }));
        assert!(decode_state(&d).is_empty());
        let d = doc(json!({ "annotations": { "workload.cattle.io/state": "{\"a\": 1}" } }));
        assert!(decode_state(&d).is_empty());
        assert!(decode_state(&Document::new()).is_empty());
    }

    #[test]
    fn encode_keeps_other_annotations() {
        let mut d = doc(json!({ "annotations": { "team": "infra" } }));
        let mut state = SchedulingState::new();
        state.insert("k".into(), "v".into());
        encode_state(&mut d, &state);
        assert_eq!(d["annotations"]["team"], json!("infra"));
        assert_eq!(d["annotations"][STATE_ANNOTATION], json!("{\"k\":\"v\"}"));
        assert_eq!(decode_state(&d), state);
    }

    #[tokio::test]
    async fn pinned_node_is_resolved_and_recorded() {
        let mut d = doc(json!({
            "scheduling": { "node": { "nodeId": "c-abc:m-123" } },
            "annotations": { "workload.cattle.io/state": "{\"old\":\"c-abc:m-000\"}" }
        }));
        set_scheduling(&mut d, &nodes()).await;
        assert_eq!(d["scheduling"]["node"]["nodeId"], json!("worker-1"));
        let state = decode_state(&d);
        assert_eq!(state.len(), 2);
        assert_eq!(state.node_id_for("worker-1"), Some("c-abc:m-123"));
        assert_eq!(state.get("old"), Some("c-abc:m-000"));

        assert!(restore_node_id(&mut d));
        assert_eq!(d["scheduling"]["node"]["nodeId"], json!("c-abc:m-123"));
    }

    #[tokio::test]
    async fn unknown_node_leaves_document_untouched() {
        let mut d = doc(json!({ "scheduling": { "node": { "nodeId": "c-abc:m-999" } } }));
        let before = d.clone();
        set_scheduling(&mut d, &nodes()).await;
        assert_eq!(d, before);
        assert!(!restore_node_id(&mut d));
    }

    #[tokio::test]
    async fn missing_node_clears_top_level_node_id() {
        let mut d = doc(json!({ "nodeId": "stale", "scheduling": { "node": {} } }));
        set_scheduling(&mut d, &nodes()).await;
        assert_eq!(d["nodeId"], json!(""));
        assert!(!d.contains_key("annotations"));
    }
}
