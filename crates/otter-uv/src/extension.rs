//! Extension system for exposing native ops to a script runtime
//!
//! An [`Extension`] bundles named [`Op`]s. A host either registers extensions
//! in an [`ExtensionRegistry`] and calls ops by name, or asks an extension for
//! its [`exports`](Extension::exports) object and installs that as a module.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{UvError, UvResult};
use crate::value::{Function, Object, Value};

/// Result type for native operations
pub type OpResult = UvResult<Value>;

/// Native operation handler
pub type OpFn = Arc<dyn Fn(&[Value]) -> OpResult + Send + Sync>;

/// A single operation definition
#[derive(Clone)]
pub struct Op {
    /// Operation name (the export name)
    pub name: String,
    /// Handler function
    pub handler: OpFn,
}

impl Op {
    /// Call the handler
    pub fn call(&self, args: &[Value]) -> OpResult {
        (self.handler)(args)
    }

    /// Wrap as a script function. Errors become thrown values.
    pub fn to_function(&self) -> Function {
        let handler = Arc::clone(&self.handler);
        Function::new(self.name.as_str(), move |args| {
            handler(args).map_err(|err| err.to_value())
        })
    }
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Op").field("name", &self.name).finish()
    }
}

/// Helper to create a native operation
///
/// # Example
/// ```
/// use otter_uv::{Value, op_native};
///
/// let op = op_native("double", |args| {
///     let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
///     Ok(Value::Number(n * 2.0))
/// });
/// assert_eq!(op.call(&[Value::Number(4.0)]).unwrap().as_number(), Some(8.0));
/// ```
pub fn op_native<F>(name: impl Into<String>, handler: F) -> Op
where
    F: Fn(&[Value]) -> OpResult + Send + Sync + 'static,
{
    Op {
        name: name.into(),
        handler: Arc::new(handler),
    }
}

/// Extension bundle
#[derive(Clone, Debug)]
pub struct Extension {
    name: String,
    ops: Vec<Op>,
}

impl Extension {
    /// Create a new extension with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    /// Add operations to the extension (builder pattern)
    pub fn with_ops(mut self, ops: Vec<Op>) -> Self {
        self.ops = ops;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Module object with one function per op, in declaration order
    pub fn exports(&self) -> Object {
        let exports = Object::new();
        for op in &self.ops {
            exports.set(op.name.clone(), Value::Function(op.to_function()));
        }
        exports
    }
}

/// Extension registry
///
/// Manages registered extensions and provides lookup for operations.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, Extension>,
    ops: HashMap<String, Op>,
    /// Registration order, used for the global object
    load_order: Vec<String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension
    ///
    /// Returns error if:
    /// - An extension with the same name exists
    /// - An operation name conflicts with an existing one
    pub fn register(&mut self, ext: Extension) -> UvResult<()> {
        if self.extensions.contains_key(&ext.name) {
            return Err(UvError::internal(format!(
                "Extension already registered: {}",
                ext.name
            )));
        }

        for op in &ext.ops {
            if self.ops.contains_key(&op.name) {
                return Err(UvError::internal(format!(
                    "Operation '{}' already registered (extension '{}')",
                    op.name, ext.name
                )));
            }
        }

        // The extension keeps its ops so `exports()` still works after registration.
        for op in &ext.ops {
            self.ops.insert(op.name.clone(), op.clone());
        }

        tracing::debug!(extension = %ext.name, ops = ext.ops.len(), "extension registered");
        self.load_order.push(ext.name.clone());
        self.extensions.insert(ext.name.clone(), ext);
        Ok(())
    }

    /// Call an op by name. Unknown names are a `TypeError`, as calling an
    /// undefined global would be.
    pub fn call(&self, name: &str, args: &[Value]) -> OpResult {
        match self.ops.get(name) {
            Some(op) => op.call(args),
            None => Err(UvError::type_error(format!("{} is not a function", name))),
        }
    }

    /// Every op as a function on one object, extensions in registration order
    pub fn globals(&self) -> Object {
        let globals = Object::new();
        for ext in self.load_order.iter().filter_map(|name| self.extensions.get(name)) {
            for op in ext.ops() {
                globals.set(op.name.clone(), Value::Function(op.to_function()));
            }
        }
        globals
    }
}
