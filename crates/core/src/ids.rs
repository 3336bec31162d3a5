//! Composite identifiers (`<type>:<shortId>[:...]`) and workload ids.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::values::{self, Document};
use crate::{CorralError, CorralResult};

/// Split `<type>:<rest>`; identifiers without a colon have no type.
pub fn split_type_and_id(id: &str) -> (Option<&str>, &str) {
    match id.split_once(':') {
        Some((ty, rest)) => (Some(ty), rest),
        None => (None, id),
    }
}

/// The short identifier: the second colon-delimited segment, or the whole id
/// when it has no colon.
pub fn short_id(id: &str) -> &str {
    id.split(':').nth(1).unwrap_or(id)
}

/// Identifier handed to storage reads. Only ids carrying more than one colon
/// are reduced.
pub fn read_id(id: &str) -> &str {
    if id.matches(':').count() > 1 {
        short_id(id)
    } else {
        id
    }
}

pub fn composite_id(kind: &str, name: &str) -> String {
    format!("{}:{}", kind, name)
}

/// Canonical selector value for a workload: `<kind>-<namespaceId>-<name>`.
pub fn workload_id(kind: &str, data: &Document) -> String {
    format!(
        "{}-{}-{}",
        kind,
        values::get_string(data, &["namespaceId"]),
        values::get_string(data, &["name"])
    )
}

/// Stamp storage-owned fields on a new document and return its short id.
pub fn stamp_created(kind: &str, data: &mut Document) -> CorralResult<String> {
    let name = values::get_string(data, &["name"]);
    if name.is_empty() {
        return Err(CorralError::InvalidOption("name is required".into()));
    }
    data.insert("id".into(), Value::String(composite_id(kind, &name)));
    if values::is_empty(data.get("uuid")) {
        data.insert("uuid".into(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    data.insert(
        "created".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    Ok(name)
}

/// Carry storage-owned fields from the stored copy onto an update payload.
pub fn carry_stamps(previous: &Document, data: &mut Document) {
    for key in ["id", "uuid", "created"] {
        if let Some(v) = previous.get(key) {
            data.insert(key.to_string(), v.clone());
        }
    }
}
