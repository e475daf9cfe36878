//! Host callback ownership.
//!
//! Timers hold a [`OneShot`]: invoking it consumes it, so the type system rules
//! out a second call. Servers hold a [`Persistent`] callback that stays alive
//! until the server record is dropped.

use crate::value::{CallResult, Function, Value};

/// Callback invoked at most once.
#[derive(Debug)]
pub struct OneShot(Function);

impl OneShot {
    pub fn new(function: Function) -> Self {
        Self(function)
    }

    /// Invoke and consume the callback
    pub fn invoke(self, args: &[Value]) -> CallResult {
        self.0.call(args)
    }
}

/// Callback kept for the owner's whole lifetime and invoked any number of times.
#[derive(Debug, Clone)]
pub struct Persistent(Function);

impl Persistent {
    pub fn new(function: Function) -> Self {
        Self(function)
    }

    pub fn invoke(&self, args: &[Value]) -> CallResult {
        self.0.call(args)
    }
}

/// Log an exception thrown by a host callback. Exceptions never unwind into
/// the loop; the next completion is dispatched regardless.
pub(crate) fn report_exception(kind: &str, id: u64, result: CallResult) {
    if let Err(thrown) = result {
        tracing::warn!("{} {} callback error: {:?}", kind, id, thrown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Function {
        let counter = counter.clone();
        Function::new("count", move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn test_persistent_invokes_repeatedly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let callback = Persistent::new(counting(&counter));
        for _ in 0..3 {
            callback.invoke(&[]).unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_one_shot_invokes_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        OneShot::new(counting(&counter)).invoke(&[]).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
