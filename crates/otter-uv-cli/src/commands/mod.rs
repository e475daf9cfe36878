//! CLI command implementations.
//!
//! Every command talks to the bridge through the `uv` export table, the same
//! surface a script would see.

pub mod cat;
pub mod copy;
pub mod demo;
pub mod serve;
pub mod sleep;
pub mod stat;

use std::path::Path;

use anyhow::Result;
use otter_uv::{
    ContextSlot, ExtensionRegistry, Object, PromiseState, UvConfig, Value, uv_extension,
};

/// A context plus the registry its ops live in
pub struct Session {
    slot: ContextSlot,
    registry: ExtensionRegistry,
    uv: Object,
}

impl Session {
    pub fn new(config: UvConfig) -> Result<Self> {
        let slot = ContextSlot::new();
        slot.initialize(config)?;

        let mut registry = ExtensionRegistry::new();
        registry.register(uv_extension(slot.clone()))?;
        let uv = registry.globals();
        Ok(Self { slot, registry, uv })
    }

    /// The export object, for callbacks that call back into the bridge
    pub fn exports(&self) -> &Object {
        &self.uv
    }

    /// Call an op by name
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        Ok(self.registry.call(name, args)?)
    }

    /// Run the loop to completion and return its status
    pub fn run(&self) -> Result<i32> {
        let status = self.call("run", &[])?;
        Ok(status.as_number().unwrap_or_default() as i32)
    }

    /// Drive the loop until `promise` settles
    pub fn settle(&self, promise: Value) -> Result<Value> {
        let Some(promise) = promise.as_promise().cloned() else {
            return Ok(promise);
        };
        while promise.is_pending() {
            if self.run()? == 0 && promise.is_pending() {
                anyhow::bail!("event loop drained with the promise still pending");
            }
        }
        match promise.state() {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(error) => Err(anyhow::anyhow!(describe(&error))),
            PromiseState::Pending => anyhow::bail!("promise still pending"),
        }
    }

    /// Tear the context down; fails if records are still live
    pub fn close(self) -> Result<()> {
        self.slot.teardown()?;
        Ok(())
    }
}

/// Call through the export object, as a script callback would; a thrown
/// value becomes an error
pub fn call_export(uv: &Object, name: &str, args: &[Value]) -> Result<Value> {
    let export = uv
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("uv.{} is not exported", name))?;
    let function = export
        .as_function()
        .ok_or_else(|| anyhow::anyhow!("uv.{} is not a function", name))?;
    function.call(args).map_err(|thrown| anyhow::anyhow!(describe(&thrown)))
}

/// A path as the string the ops take. Paths that are not valid UTF-8 are an
/// error, since a lossy conversion could name a different file.
pub fn path_value(path: &Path) -> Result<Value> {
    let path = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8: {}", path.display()))?;
    Ok(Value::from(path))
}

/// Human-readable form of a thrown or rejected value
pub fn describe(value: &Value) -> String {
    match value.get("message").as_ref().and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => value.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_value_keeps_utf8_paths() {
        let value = path_value(Path::new("dir/file.txt")).unwrap();
        assert_eq!(value.as_str(), Some("dir/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_path_value_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"bad\xffname"));
        let err = path_value(path).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }
}
