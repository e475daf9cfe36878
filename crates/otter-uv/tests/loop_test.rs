//! Loop control, timers and context lifecycle

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use otter_uv::{ContextSlot, Function, Object, UvConfig, UvError, Value, uv_extension};

fn setup() -> (ContextSlot, Object) {
    let slot = ContextSlot::new();
    slot.initialize(UvConfig::default()).unwrap();
    let exports = uv_extension(slot.clone()).exports();
    (slot, exports)
}

fn call(exports: &Object, name: &str, args: &[Value]) -> Result<Value, Value> {
    let function = exports.get(name).unwrap();
    function.as_function().unwrap().call(args)
}

fn counter_fn(counter: &Arc<AtomicUsize>) -> Value {
    let counter = Arc::clone(counter);
    Value::Function(Function::new("tick", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Undefined)
    }))
}

#[test]
fn test_run_with_nothing_pending_returns_zero() {
    let (_slot, uv) = setup();
    let status = call(&uv, "run", &[]).unwrap();
    assert_eq!(status.as_number(), Some(0.0));
}

#[test]
fn test_zero_delay_timer_fires_exactly_once() {
    let (slot, uv) = setup();
    let counter = Arc::new(AtomicUsize::new(0));

    let id = call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(0.0)]).unwrap();
    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(0.0));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Running again does not re-fire, and the record is gone.
    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(0.0));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(slot.lookup().unwrap().live_timers(), 0);
    assert_eq!(
        call(&uv, "clearTimeout", &[id]).unwrap().as_bool(),
        Some(false)
    );
}

#[test]
fn test_negative_delay_is_clamped() {
    let (_slot, uv) = setup();
    let counter = Arc::new(AtomicUsize::new(0));
    call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(-100.0)]).unwrap();
    call(&uv, "run", &[]).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_from_callback_leaves_work_pending() {
    let (slot, uv) = setup();
    let fired = Arc::new(AtomicUsize::new(0));

    let stopper = {
        let uv = uv.clone();
        Value::Function(Function::new("stopper", move |_| {
            call(&uv, "stop", &[])?;
            Ok(Value::Undefined)
        }))
    };
    call(&uv, "setTimeout", &[stopper, Value::Number(0.0)]).unwrap();
    let late = call(&uv, "setTimeout", &[counter_fn(&fired), Value::Number(60_000.0)]).unwrap();

    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(1.0));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(slot.lookup().unwrap().live_timers(), 1);

    assert_eq!(call(&uv, "clearTimeout", &[late]).unwrap().as_bool(), Some(true));
    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(0.0));
}

#[test]
fn test_run_is_not_reentrant() {
    let (_slot, uv) = setup();
    let seen = Arc::new(Mutex::new(None));

    let reenter = {
        let uv = uv.clone();
        let seen = Arc::clone(&seen);
        Value::Function(Function::new("reenter", move |_| {
            let thrown = call(&uv, "run", &[]).unwrap_err();
            *seen.lock() = thrown.get("message").and_then(|m| m.as_str().map(String::from));
            Ok(Value::Undefined)
        }))
    };
    call(&uv, "setTimeout", &[reenter, Value::Number(0.0)]).unwrap();
    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(0.0));
    assert_eq!(
        seen.lock().as_deref(),
        Some("Event loop is already running")
    );
}

#[test]
fn test_run_once_dispatches_ready_work_only() {
    let (_slot, uv) = setup();
    let early = Arc::new(AtomicUsize::new(0));
    let late = Arc::new(AtomicUsize::new(0));
    call(&uv, "setTimeout", &[counter_fn(&early), Value::Number(0.0)]).unwrap();
    call(&uv, "setTimeout", &[counter_fn(&late), Value::Number(200.0)]).unwrap();

    let status = call(&uv, "run", &[Value::from("once")]).unwrap();
    assert_eq!(status.as_number(), Some(1.0));
    assert_eq!(early.load(Ordering::SeqCst), 1);
    assert_eq!(late.load(Ordering::SeqCst), 0);

    assert_eq!(call(&uv, "run", &[Value::from("default")]).unwrap().as_number(), Some(0.0));
    assert_eq!(late.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_nowait_does_not_block() {
    let (_slot, uv) = setup();
    let counter = Arc::new(AtomicUsize::new(0));
    let id = call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(60_000.0)]).unwrap();

    let status = call(&uv, "run", &[Value::from("nowait")]).unwrap();
    assert_eq!(status.as_number(), Some(1.0));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    call(&uv, "clearTimeout", &[id]).unwrap();
}

#[test]
fn test_timer_callbacks_can_schedule_more_work() {
    let (_slot, uv) = setup();
    let counter = Arc::new(AtomicUsize::new(0));

    let chain = {
        let uv = uv.clone();
        let counter = Arc::clone(&counter);
        Value::Function(Function::new("chain", move |_| {
            call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(1.0)])?;
            Ok(Value::Undefined)
        }))
    };
    call(&uv, "setTimeout", &[chain, Value::Number(0.0)]).unwrap();
    assert_eq!(call(&uv, "run", &[]).unwrap().as_number(), Some(0.0));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_teardown_refuses_while_records_are_live() {
    let (slot, uv) = setup();
    let counter = Arc::new(AtomicUsize::new(0));
    let id = call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(60_000.0)]).unwrap();

    match slot.teardown() {
        Err(UvError::Busy {
            requests,
            timers,
            servers,
        }) => assert_eq!((requests, timers, servers), (0, 1, 0)),
        other => panic!("expected Busy, got {:?}", other),
    }
    assert!(slot.is_initialized());

    call(&uv, "clearTimeout", &[id]).unwrap();
    slot.teardown().unwrap();

    assert!(matches!(slot.lookup(), Err(UvError::Unavailable)));
    let thrown = call(&uv, "setTimeout", &[counter_fn(&counter), Value::Number(0.0)]).unwrap_err();
    assert_eq!(
        thrown.get("message").unwrap().as_str(),
        Some("Event loop not available")
    );
}

#[test]
fn test_teardown_from_callback_is_refused() {
    let (slot, uv) = setup();
    let refused = Arc::new(AtomicUsize::new(0));

    let attempt = {
        let slot = slot.clone();
        let refused = Arc::clone(&refused);
        Value::Function(Function::new("attempt", move |_| {
            if matches!(slot.teardown(), Err(UvError::AlreadyRunning)) {
                refused.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Value::Undefined)
        }))
    };
    call(&uv, "setTimeout", &[attempt, Value::Number(0.0)]).unwrap();
    call(&uv, "run", &[]).unwrap();

    assert_eq!(refused.load(Ordering::SeqCst), 1);
    slot.teardown().unwrap();
}
