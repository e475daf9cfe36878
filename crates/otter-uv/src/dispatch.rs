//! Completion dispatcher
//!
//! Turns events delivered by the loop into script-visible effects: settles
//! request promises, fires timers, and reports connections.

use crate::context::HandleContext;
use crate::error::{NativeError, UvError, UvResult};
use crate::event_loop::LoopEvent;
use crate::request::{FsOutcome, StatInfo};
use crate::value::{Object, Value};

/// Dispatch a single completion. Runs on the driving thread; no lock is held
/// while host code runs.
pub(crate) fn dispatch_event(context: &HandleContext, event: LoopEvent) -> UvResult<()> {
    match event {
        LoopEvent::Fs { id, outcome } => complete_request(context, id, outcome),
        LoopEvent::TimerFired { id } => {
            context.fire_timer(id);
            Ok(())
        }
        LoopEvent::Connection { id, result } => {
            context.deliver_connection(id, result);
            Ok(())
        }
        LoopEvent::Wakeup => Ok(()),
    }
}

/// Settle the promise of request `id` and release its record.
///
/// A completion with no matching record means the record was released twice
/// or never inserted; that is reported as an internal error.
pub(crate) fn complete_request(
    context: &HandleContext,
    id: u64,
    outcome: Result<FsOutcome, NativeError>,
) -> UvResult<()> {
    let record = context
        .requests
        .remove(id)
        .ok_or_else(|| UvError::internal(format!("completion for unknown request {}", id)))?;
    tracing::trace!(id, op = %record.op(), "completion delivered");

    match outcome {
        Ok(outcome) if outcome.op() != record.op() => {
            let message = format!(
                "request {} expected a {} completion, got {}",
                id,
                record.op(),
                outcome.op()
            );
            record.settle(Err(NativeError::from_errno(libc::EIO)));
            Err(UvError::internal(message))
        }
        Ok(outcome) => {
            record.settle(Ok(outcome_value(outcome)));
            Ok(())
        }
        Err(err) => {
            record.settle(Err(err));
            Ok(())
        }
    }
}

/// Script value for a successful file operation
pub fn outcome_value(outcome: FsOutcome) -> Value {
    match outcome {
        FsOutcome::Read(bytes) => Value::from(bytes),
        FsOutcome::Written(count) => Value::Number(count as f64),
        FsOutcome::Stat(info) => stat_value(&info),
    }
}

/// `{ size, mode, mtime, ctime, atime }`
pub fn stat_value(info: &StatInfo) -> Value {
    let stat = Object::new();
    stat.set("size", Value::Number(info.size as f64));
    stat.set("mode", Value::Number(info.mode as f64));
    stat.set("mtime", Value::Number(info.mtime as f64));
    stat.set("ctime", Value::Number(info.ctime as f64));
    stat.set("atime", Value::Number(info.atime as f64));
    Value::Object(stat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UvConfig;
    use crate::promise::{JsPromise, PromiseState};
    use crate::request::{FsOp, RequestRecord};

    fn context() -> std::sync::Arc<HandleContext> {
        HandleContext::new(UvConfig::default()).unwrap()
    }

    #[test]
    fn test_unknown_request_is_internal_error() {
        let context = context();
        let result = complete_request(&context, 42, Ok(FsOutcome::Written(1)));
        assert!(matches!(result, Err(UvError::Internal(_))));
    }

    #[test]
    fn test_read_completion_resolves_exact_bytes() {
        let context = context();
        let (promise, resolvers) = JsPromise::with_resolvers();
        let id = context.requests.next_id();
        context
            .requests
            .insert(id, RequestRecord::new(id, FsOp::Read, "a.txt".into(), resolvers));

        complete_request(&context, id, Ok(FsOutcome::Read(b"hello".to_vec()))).unwrap();

        assert_eq!(context.live_requests(), 0);
        match promise.state() {
            PromiseState::Fulfilled(Value::ArrayBuffer(buffer)) => {
                assert_eq!(buffer.as_bytes(), b"hello")
            }
            other => panic!("unexpected state: {:?}", other),
        }
        // The record is gone; a second completion cannot settle it again.
        assert!(complete_request(&context, id, Ok(FsOutcome::Read(Vec::new()))).is_err());
    }

    #[test]
    fn test_failed_completion_rejects_with_code() {
        let context = context();
        let (promise, resolvers) = JsPromise::with_resolvers();
        let id = context.requests.next_id();
        context
            .requests
            .insert(id, RequestRecord::new(id, FsOp::Stat, "missing".into(), resolvers));

        complete_request(&context, id, Err(NativeError::from_errno(libc::ENOENT))).unwrap();

        match promise.state() {
            PromiseState::Rejected(error) => {
                assert_eq!(
                    error.get("code").and_then(|v| v.as_number()),
                    Some(-libc::ENOENT as f64)
                );
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_completion_rejects_and_reports() {
        let context = context();
        let (promise, resolvers) = JsPromise::with_resolvers();
        let id = context.requests.next_id();
        context
            .requests
            .insert(id, RequestRecord::new(id, FsOp::Write, "out".into(), resolvers));

        let result = complete_request(&context, id, Ok(FsOutcome::Read(Vec::new())));
        assert!(matches!(result, Err(UvError::Internal(_))));
        assert_eq!(promise.state_name(), "rejected");
        assert_eq!(context.live_requests(), 0);
    }

    #[test]
    fn test_stat_value_shape() {
        let value = stat_value(&StatInfo {
            size: 5,
            mode: 0o100644,
            mtime: 10,
            ctime: 11,
            atime: 12,
        });
        let keys = value.as_object().unwrap().keys();
        assert_eq!(keys, vec!["size", "mode", "mtime", "ctime", "atime"]);
        assert_eq!(value.get("size").unwrap().as_number(), Some(5.0));
    }
}
