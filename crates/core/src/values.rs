//! Soft accessors over untyped workload documents.
//!
//! Lookups return `None` for absent fields and for intermediate fields of the
//! wrong type; writers create (or replace) intermediate maps as needed.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

/// An untyped, ordered workload document.
pub type Document = Map<String, Value>;

pub fn get_value<'a>(data: &'a Document, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut cur = data;
    for key in parents {
        cur = cur.get(*key)?.as_object()?;
    }
    cur.get(*last)
}

pub fn get_value_mut<'a>(data: &'a mut Document, path: &[&str]) -> Option<&'a mut Value> {
    let (last, parents) = path.split_last()?;
    let mut cur = data;
    for key in parents {
        cur = cur.get_mut(*key)?.as_object_mut()?;
    }
    cur.get_mut(*last)
}

pub fn get_map<'a>(data: &'a Document, path: &[&str]) -> Option<&'a Document> {
    get_value(data, path)?.as_object()
}

pub fn get_slice<'a>(data: &'a Document, path: &[&str]) -> Option<&'a Vec<Value>> {
    get_value(data, path)?.as_array()
}

/// String rendering of the value at `path`; empty when absent or null.
pub fn get_string(data: &Document, path: &[&str]) -> String {
    get_value(data, path).map(to_string).unwrap_or_default()
}

pub fn put_value(data: &mut Document, value: Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else { return };
    let mut cur = data;
    for key in parents {
        let entry = cur
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cur = match entry.as_object_mut() {
            Some(m) => m,
            None => return,
        };
    }
    cur.insert(last.to_string(), value);
}

pub fn remove_value(data: &mut Document, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut cur = data;
    for key in parents {
        cur = cur.get_mut(*key)?.as_object_mut()?;
    }
    cur.remove(*last)
}

/// Scalar-to-string conversion; null renders empty, composites render as JSON.
pub fn to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Absent, null, empty string, empty map and empty sequence all count as empty.
pub fn is_empty(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Object(m)) => m.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

pub fn to_number(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| anyhow!("number out of range: {}", n)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map_err(|_| anyhow!("not a number: {:?}", s))
        }
        other => Err(anyhow!("not a number: {}", other)),
    }
}
