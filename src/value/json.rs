//! Conversion between values and `serde_json` documents.

use crate::error::{ReactiveError, Result};
use crate::value::{ContainerKind, Key, ObjectId, ObjectRef, Value};
use serde_json::{Map, Number, Value as Json};
use std::collections::HashSet;

impl Value {
    /// Build a value from a JSON document. Objects and arrays become fresh
    /// raw records and sequences.
    ///
    /// ```
    /// use tincan_observe::{Key, Value};
    ///
    /// let state = Value::from_json(serde_json::json!({ "todos": ["write docs"] }));
    /// let todos = state.as_object().unwrap().get(&Key::from("todos")).unwrap();
    /// assert_eq!(todos.as_object().unwrap().len(), 1);
    /// ```
    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s),
            Json::Array(items) => {
                Value::Object(ObjectRef::sequence_from(items.into_iter().map(Value::from_json)))
            }
            Json::Object(fields) => Value::Object(ObjectRef::record_from(
                fields.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value as JSON, reading raw objects and wrappers alike
    /// without tracking.
    ///
    /// Sequences become arrays and every other container becomes an object
    /// with stringified keys. Non-finite floats become `null`.
    pub fn to_json(&self) -> Result<Json> {
        let mut path = HashSet::new();
        to_json(self, &mut path)
    }
}

fn to_json(value: &Value, path: &mut HashSet<ObjectId>) -> Result<Json> {
    let object = match value {
        Value::Null => return Ok(Json::Null),
        Value::Bool(b) => return Ok(Json::Bool(*b)),
        Value::Int(n) => return Ok(Json::Number((*n).into())),
        Value::Float(x) => return Ok(Number::from_f64(*x).map_or(Json::Null, Json::Number)),
        Value::Str(s) => return Ok(Json::String(s.clone())),
        Value::Object(object) => object,
        Value::Observed(observed) => observed.raw(),
    };

    if !path.insert(object.id()) {
        return Err(ReactiveError::Cycle(object.id()));
    }
    let json = if object.kind() == ContainerKind::Sequence {
        let len = object.len();
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            items.push(to_json(&object.get(&Key::Index(index)).unwrap_or_default(), path)?);
        }
        Json::Array(items)
    } else {
        let mut keys = object.keys();
        keys.sort();
        let mut fields = Map::new();
        for key in &keys {
            let field = to_json(&object.get(key).unwrap_or_default(), path)?;
            fields.insert(key.to_string(), field);
        }
        Json::Object(fields)
    };
    path.remove(&object.id());
    Ok(json)
}
