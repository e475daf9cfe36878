//! Host value model
//!
//! The bridge does not embed a script engine. It exchanges values with the host
//! through this small model: primitives, byte buffers, ordered objects, callable
//! functions and promises. A host adapter maps these onto its own engine values.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};

use crate::promise::JsPromise;

/// Result of calling a host function. `Err` carries the thrown value.
pub type CallResult = Result<Value, Value>;

/// Native function body
pub type NativeFn = Arc<dyn Fn(&[Value]) -> CallResult + Send + Sync>;

/// A script value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number (all script numbers are doubles)
    Number(f64),
    /// String
    String(Arc<str>),
    /// Raw byte buffer
    ArrayBuffer(ArrayBuffer),
    /// Object with ordered properties
    Object(Object),
    /// Callable function
    Function(Function),
    /// Promise
    Promise(JsPromise),
}

impl Value {
    /// Type name as reported by `typeof`-style diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::ArrayBuffer(_) => "ArrayBuffer",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Promise(_) => "Promise",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array_buffer(&self) -> Option<&ArrayBuffer> {
        match self {
            Value::ArrayBuffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&JsPromise> {
        match self {
            Value::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    /// Property lookup on objects; `None` for every other kind.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Lossy JSON view, used for printing and diagnostics.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Undefined | Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    json!(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null)
                }
            }
            Value::String(s) => JsonValue::String(s.to_string()),
            Value::ArrayBuffer(buffer) => json!({ "byteLength": buffer.len() }),
            Value::Object(object) => JsonValue::Object(
                object
                    .entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.to_json()))
                    .collect(),
            ),
            Value::Function(function) => {
                JsonValue::String(format!("[Function: {}]", function.name()))
            }
            Value::Promise(_) => JsonValue::String("[Promise]".to_string()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Promise(promise) => f
                .debug_tuple("Promise")
                .field(&promise.state_name())
                .finish(),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::ArrayBuffer(ArrayBuffer::new(bytes))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl From<JsPromise> for Value {
    fn from(promise: JsPromise) -> Self {
        Value::Promise(promise)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => {
                let object = Object::new();
                for (index, item) in items.into_iter().enumerate() {
                    object.set(index.to_string(), Value::from(item));
                }
                object.set("length", Value::Number(object.len() as f64));
                Value::Object(object)
            }
            JsonValue::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.set(key, Value::from(value));
                }
                Value::Object(object)
            }
        }
    }
}

/// Immutable byte buffer handed to the script.
///
/// The bytes are moved in once; the buffer is never shared with a native
/// operation after that.
#[derive(Clone, PartialEq, Eq)]
pub struct ArrayBuffer(Arc<[u8]>);

impl ArrayBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayBuffer({} bytes)", self.len())
    }
}

/// Script object: shared, mutable, insertion-ordered properties.
#[derive(Clone, Default)]
pub struct Object(Arc<Mutex<IndexMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a property (cloned out of the object)
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    /// Set a property, replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.lock().insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.lock().keys().cloned().collect()
    }

    /// Snapshot of all properties in insertion order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A host-callable function value.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    body: NativeFn,
}

impl Function {
    /// Wrap a native closure as a script function
    pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(&[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the function. The call runs to completion on the caller's thread.
    pub fn call(&self, args: &[Value]) -> CallResult {
        (self.body)(args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}
