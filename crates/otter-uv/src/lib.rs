//! # Otter UV
//!
//! Async-operation bridge between a cooperative event loop and a script
//! runtime:
//! - File reads, writes and stats that settle promises exactly once
//! - One-shot timers with cancellation
//! - Notify-only TCP servers
//! - A per-runtime handle context with libuv-style `run` / `stop`
//!
//! ```
//! use otter_uv::{ContextSlot, UvConfig, Value, uv_extension};
//!
//! let slot = ContextSlot::new();
//! slot.initialize(UvConfig::default()).unwrap();
//! let uv = uv_extension(slot.clone()).exports();
//!
//! let run = uv.get("run").unwrap();
//! let status = run.as_function().unwrap().call(&[]).unwrap();
//! assert_eq!(status.as_number(), Some(0.0));
//! slot.teardown().unwrap();
//! ```

#![warn(clippy::all)]

pub mod callback;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod extension;
mod fs;
pub mod ops;
pub mod promise;
pub mod request;
pub mod server;
mod table;
pub mod timer;
pub mod value;

pub use callback::{OneShot, Persistent};
pub use config::UvConfig;
pub use context::{ContextSlot, HandleContext, RUN_DRAINED, RUN_PENDING};
pub use error::{NativeError, UV_EOF, UvError, UvResult};
pub use event_loop::{EventLoop, LoopEvent, RunMode};
pub use extension::{Extension, ExtensionRegistry, Op, OpResult, op_native};
pub use ops::{EXTENSION_NAME, uv_extension};
pub use promise::{JsPromise, JsResolvers, Promise, PromiseState, Resolvers};
pub use request::{FsOp, FsOutcome, StatInfo};
pub use server::ServerInfo;
pub use value::{ArrayBuffer, CallResult, Function, Object, Value};
pub use timer::MAX_TIMER_DELAY;
