//! The `uv` extension: script-facing exports.
//!
//! Each op resolves the context through the runtime's [`ContextSlot`] first,
//! then validates its arguments. Validation failures are thrown as
//! `TypeError`s before any record or promise exists.

use std::time::Duration;

use crate::context::ContextSlot;
use crate::error::{UvError, UvResult};
use crate::event_loop::RunMode;
use crate::extension::{Extension, op_native};
use crate::value::{Function, Value};

/// Name the extension registers under
pub const EXTENSION_NAME: &str = "uv";

/// Create the `uv` extension bound to `slot`.
pub fn uv_extension(slot: ContextSlot) -> Extension {
    let fs_read = {
        let slot = slot.clone();
        op_native("fsRead", move |args| {
            let context = slot.lookup()?;
            let path = path_arg(args, "fsRead")?;
            Ok(Value::Promise(context.read_file(path)))
        })
    };

    let fs_write = {
        let slot = slot.clone();
        op_native("fsWrite", move |args| {
            let context = slot.lookup()?;
            let path = path_arg(args, "fsWrite")?;
            let data = data_arg(args.get(1))?;
            Ok(Value::Promise(context.write_file(path, data)))
        })
    };

    let fs_stat = {
        let slot = slot.clone();
        op_native("fsStat", move |args| {
            let context = slot.lookup()?;
            let path = path_arg(args, "fsStat")?;
            Ok(Value::Promise(context.stat(path)))
        })
    };

    let create_tcp_server = {
        let slot = slot.clone();
        op_native("createTCPServer", move |args| {
            let context = slot.lookup()?;
            let port = port_arg(args.first())?;
            let callback = function_arg(args.get(1), "createTCPServer")?;
            context.create_tcp_server(port, callback)
        })
    };

    let set_timeout = {
        let slot = slot.clone();
        op_native("setTimeout", move |args| {
            let context = slot.lookup()?;
            let callback = function_arg(args.first(), "setTimeout")?;
            let delay = delay_arg(args.get(1))?;
            let id = context.set_timeout(callback, delay)?;
            Ok(Value::Number(id as f64))
        })
    };

    let clear_timeout = {
        let slot = slot.clone();
        op_native("clearTimeout", move |args| {
            let context = slot.lookup()?;
            let cleared = timer_id_arg(args.first())
                .map(|id| context.clear_timeout(id))
                .unwrap_or(false);
            Ok(Value::Bool(cleared))
        })
    };

    let run = {
        let slot = slot.clone();
        op_native("run", move |args| {
            let context = slot.lookup()?;
            let mode = mode_arg(args.first())?;
            let status = context.run(mode)?;
            Ok(Value::Number(status as f64))
        })
    };

    let stop = op_native("stop", move |_args| {
        slot.lookup()?.stop();
        Ok(Value::Undefined)
    });

    Extension::new(EXTENSION_NAME).with_ops(vec![
        fs_read,
        fs_write,
        fs_stat,
        create_tcp_server,
        set_timeout,
        clear_timeout,
        run,
        stop,
    ])
}

fn path_arg<'a>(args: &'a [Value], op: &str) -> UvResult<&'a str> {
    match args.first().and_then(Value::as_str) {
        Some(path) if !path.is_empty() => Ok(path),
        _ => Err(UvError::type_error(format!(
            "{}: path must be a non-empty string",
            op
        ))),
    }
}

/// Payload bytes, copied out of the script value.
fn data_arg(value: Option<&Value>) -> UvResult<Vec<u8>> {
    match value {
        Some(Value::String(s)) => Ok(s.as_bytes().to_vec()),
        Some(Value::ArrayBuffer(buffer)) => Ok(buffer.as_bytes().to_vec()),
        _ => Err(UvError::type_error(
            "fsWrite: data must be a string or ArrayBuffer",
        )),
    }
}

fn function_arg(value: Option<&Value>, op: &str) -> UvResult<Function> {
    value
        .and_then(Value::as_function)
        .cloned()
        .ok_or_else(|| UvError::type_error(format!("{}: callback must be a function", op)))
}

fn port_arg(value: Option<&Value>) -> UvResult<u16> {
    match value.and_then(Value::as_number) {
        Some(n) if n.fract() == 0.0 && (0.0..=65535.0).contains(&n) => Ok(n as u16),
        _ => Err(UvError::type_error(
            "createTCPServer: port must be an integer between 0 and 65535",
        )),
    }
}

/// Milliseconds; missing means 0, negative and NaN clamp to 0.
fn delay_arg(value: Option<&Value>) -> UvResult<Duration> {
    match value {
        None | Some(Value::Undefined) => Ok(Duration::ZERO),
        Some(Value::Number(ms)) => Ok(Duration::from_millis(ms.max(0.0) as u64)),
        Some(other) => Err(UvError::type_error(format!(
            "setTimeout: delay must be a number, got {}",
            other.type_name()
        ))),
    }
}

fn timer_id_arg(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(Value::as_number)
        .filter(|n| n.fract() == 0.0 && *n >= 1.0)
        .map(|n| n as u64)
}

fn mode_arg(value: Option<&Value>) -> UvResult<RunMode> {
    match value {
        None | Some(Value::Undefined) => Ok(RunMode::Default),
        Some(Value::String(name)) => RunMode::parse(name)
            .ok_or_else(|| UvError::type_error(format!("run: unknown mode '{}'", name))),
        Some(other) => Err(UvError::type_error(format!(
            "run: mode must be a string, got {}",
            other.type_name()
        ))),
    }
}
