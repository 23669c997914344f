//! Safe serialization of log payloads.
//!
//! Log data may contain shared nodes that point back at their ancestors,
//! error values, maps, sets and raw bytes. [`safe_serialize`] turns any such
//! tree into plain JSON without looping or failing: a node already on the
//! current path becomes `"[Circular]"`, a node that cannot be read becomes
//! `"[Unserializable Data]"`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

pub const CIRCULAR: &str = "[Circular]";
pub const UNSERIALIZABLE: &str = "[Unserializable Data]";

#[derive(Debug, Clone)]
pub enum LogData {
    Json(Value),
    List(Vec<LogData>),
    Object(Vec<(String, LogData)>),
    /// Keyed collection whose keys are themselves data; keys are stringified.
    Map(Vec<(LogData, LogData)>),
    Set(Vec<LogData>),
    Bytes(Vec<u8>),
    Error {
        name: String,
        message: String,
        causes: Vec<String>,
    },
    Shared(SharedData),
    Unserializable,
}

impl LogData {
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, LogData)>) -> Self {
        LogData::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Captures an error with its `source()` chain.
    pub fn error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::error_parts(short_type_name(err), err.to_string(), err.source())
    }

    pub fn error_parts(
        name: impl Into<String>,
        message: impl Into<String>,
        source: Option<&(dyn std::error::Error + 'static)>,
    ) -> Self {
        let mut causes = Vec::new();
        let mut source = source;
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        LogData::Error {
            name: name.into(),
            message: message.into(),
            causes,
        }
    }

    /// Serializes any `Serialize` value, degrading to a marker on failure.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => LogData::Json(v),
            Err(_) => LogData::Unserializable,
        }
    }

    pub fn to_json(&self) -> Value {
        safe_serialize(self)
    }
}

fn short_type_name(err: &(dyn std::error::Error + 'static)) -> String {
    // `dyn Error` carries no type name; the Debug form starts with it for derived errors.
    let debug = format!("{:?}", err);
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}

impl From<Value> for LogData {
    fn from(v: Value) -> Self {
        LogData::Json(v)
    }
}

impl From<&str> for LogData {
    fn from(s: &str) -> Self {
        LogData::Json(Value::String(s.to_string()))
    }
}

impl From<String> for LogData {
    fn from(s: String) -> Self {
        LogData::Json(Value::String(s))
    }
}

impl From<Vec<u8>> for LogData {
    fn from(bytes: Vec<u8>) -> Self {
        LogData::Bytes(bytes)
    }
}

impl From<SharedData> for LogData {
    fn from(node: SharedData) -> Self {
        LogData::Shared(node)
    }
}

/// A node that may be referenced from several places, including its own descendants.
#[derive(Debug, Clone)]
pub struct SharedData(Arc<RwLock<LogData>>);

impl SharedData {
    pub fn new(data: LogData) -> Self {
        SharedData(Arc::new(RwLock::new(data)))
    }

    pub fn replace(&self, data: LogData) {
        match self.0.write() {
            Ok(mut guard) => *guard = data,
            Err(poisoned) => *poisoned.into_inner() = data,
        }
    }

    pub fn to_data(&self) -> LogData {
        LogData::Shared(self.clone())
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

pub fn safe_serialize(data: &LogData) -> Value {
    let mut path = Vec::new();
    walk(data, &mut path)
}

fn walk(data: &LogData, path: &mut Vec<usize>) -> Value {
    match data {
        LogData::Json(v) => v.clone(),
        LogData::List(items) | LogData::Set(items) => {
            Value::Array(items.iter().map(|item| walk(item, path)).collect())
        }
        LogData::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k.clone(), walk(v, path));
            }
            Value::Object(map)
        }
        LogData::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                let key = match walk(k, path) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, walk(v, path));
            }
            Value::Object(map)
        }
        LogData::Bytes(bytes) => serde_json::json!({
            "type": "bytes",
            "len": bytes.len(),
            "base64": STANDARD.encode(bytes),
        }),
        LogData::Error {
            name,
            message,
            causes,
        } => serde_json::json!({
            "name": name,
            "message": message,
            "causes": causes,
        }),
        LogData::Shared(node) => {
            let addr = node.addr();
            if path.contains(&addr) {
                return Value::String(CIRCULAR.to_string());
            }
            let guard = match node.0.try_read() {
                Ok(guard) => guard,
                Err(_) => return Value::String(UNSERIALIZABLE.to_string()),
            };
            path.push(addr);
            let value = walk(&guard, path);
            path.pop();
            value
        }
        LogData::Unserializable => Value::String(UNSERIALIZABLE.to_string()),
    }
}
