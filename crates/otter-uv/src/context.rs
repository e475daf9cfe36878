//! Handle context
//!
//! One [`HandleContext`] binds one event loop to one runtime instance. The
//! runtime owns a [`ContextSlot`]; every op resolves the context through it,
//! so there is no process-wide pointer and a missing context is an ordinary
//! error instead of a null dereference.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::UvConfig;
use crate::dispatch::dispatch_event;
use crate::error::{UvError, UvResult};
use crate::event_loop::{EventLoop, LoopEvent, RunMode};
use crate::request::RequestRecord;
use crate::server::ServerRecord;
use crate::table::RecordTable;
use crate::timer::TimerRecord;

/// Loop status returned by [`HandleContext::run`] when nothing is left to do
pub const RUN_DRAINED: i32 = 0;
/// Loop status returned when `run` stopped with records still live
pub const RUN_PENDING: i32 = 1;

/// Per-runtime binding of an event loop and the records issued against it.
///
/// Records live in the context's tables, so the context outlives all of them.
pub struct HandleContext {
    config: UvConfig,
    pub(crate) event_loop: EventLoop,
    pub(crate) requests: RecordTable<RequestRecord>,
    pub(crate) timers: RecordTable<TimerRecord>,
    pub(crate) servers: RecordTable<ServerRecord>,
}

impl HandleContext {
    /// Create a context with its own loop
    pub fn new(config: UvConfig) -> UvResult<Arc<Self>> {
        config.validate()?;
        let event_loop = EventLoop::new(&config)?;
        Ok(Arc::new(Self {
            config,
            event_loop,
            requests: RecordTable::new(),
            timers: RecordTable::new(),
            servers: RecordTable::new(),
        }))
    }

    pub fn config(&self) -> &UvConfig {
        &self.config
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn live_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn live_servers(&self) -> usize {
        self.servers.len()
    }

    /// Whether any record still keeps the loop alive
    pub fn has_live_records(&self) -> bool {
        !(self.requests.is_empty() && self.timers.is_empty() && self.servers.is_empty())
    }

    /// Drive the loop.
    ///
    /// Returns [`RUN_DRAINED`] when no record is live afterwards and
    /// [`RUN_PENDING`] otherwise (stopped, or a non-default mode returned
    /// early). Fails with `AlreadyRunning` when called from a callback that is
    /// itself being dispatched by `run`, and with `Internal` when a completion
    /// arrives for a request that does not exist.
    ///
    /// A `stop` issued while the loop was idle makes the next run return
    /// before dispatching anything. Every run clears the stop flag on exit.
    pub fn run(&self, mode: RunMode) -> UvResult<i32> {
        let mut driving = Driving {
            event_loop: &self.event_loop,
            receiver: Some(self.event_loop.acquire()?),
        };
        tracing::trace!(?mode, stopped = self.event_loop.stop_requested(), "loop run");

        if let Some(receiver) = driving.receiver.as_mut() {
            self.drive(receiver, mode)?;
        }
        drop(driving);

        Ok(if self.has_live_records() {
            RUN_PENDING
        } else {
            RUN_DRAINED
        })
    }

    /// Ask a running loop to return at its next safe point.
    pub fn stop(&self) {
        tracing::trace!("loop stop requested");
        self.event_loop.request_stop();
    }

    fn drive(&self, receiver: &mut UnboundedReceiver<LoopEvent>, mode: RunMode) -> UvResult<()> {
        match mode {
            RunMode::Default => {
                while !self.event_loop.stop_requested() && self.has_live_records() {
                    match self.event_loop.wait_event(receiver)? {
                        Some(event) => dispatch_event(self, event)?,
                        None => break,
                    }
                }
                Ok(())
            }
            RunMode::Once => {
                while !self.event_loop.stop_requested() && self.has_live_records() {
                    match self.event_loop.wait_event(receiver)? {
                        Some(LoopEvent::Wakeup) => continue,
                        Some(event) => {
                            dispatch_event(self, event)?;
                            break;
                        }
                        None => break,
                    }
                }
                self.dispatch_ready(receiver)
            }
            RunMode::NoWait => {
                if self.event_loop.stop_requested() {
                    return Ok(());
                }
                if let Some(event) = self.event_loop.poll_event(receiver)? {
                    dispatch_event(self, event)?;
                }
                self.dispatch_ready(receiver)
            }
        }
    }

    /// Dispatch completions already queued, without running any more work.
    fn dispatch_ready(&self, receiver: &mut UnboundedReceiver<LoopEvent>) -> UvResult<()> {
        while !self.event_loop.stop_requested() {
            match receiver.try_recv() {
                Ok(event) => dispatch_event(self, event)?,
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Close the loop. Refused while it is being driven or while any record is
    /// live; the context is left untouched in both cases.
    pub(crate) fn close(&self) -> UvResult<()> {
        if self.event_loop.is_running() {
            return Err(UvError::AlreadyRunning);
        }
        let (requests, timers, servers) =
            (self.live_requests(), self.live_timers(), self.live_servers());
        if requests + timers + servers > 0 {
            return Err(UvError::Busy {
                requests,
                timers,
                servers,
            });
        }
        self.event_loop.close();
        Ok(())
    }
}

impl std::fmt::Debug for HandleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleContext")
            .field("event_loop", &self.event_loop)
            .field("requests", &self.live_requests())
            .field("timers", &self.live_timers())
            .field("servers", &self.live_servers())
            .finish()
    }
}

/// Returns the completion channel to the loop and consumes any stop request,
/// even if a callback panics.
struct Driving<'a> {
    event_loop: &'a EventLoop,
    receiver: Option<UnboundedReceiver<LoopEvent>>,
}

impl Drop for Driving<'_> {
    fn drop(&mut self) {
        self.event_loop.reset_stop();
        if let Some(receiver) = self.receiver.take() {
            self.event_loop.release(receiver);
        }
    }
}

/// The runtime-owned home of a [`HandleContext`].
///
/// Cloning shares the slot. Ops hold a clone and look the context up on each
/// call.
#[derive(Clone, Default)]
pub struct ContextSlot {
    inner: Arc<RwLock<Option<Arc<HandleContext>>>>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the loop and install the context. Nothing is stored on failure.
    pub fn initialize(&self, config: UvConfig) -> UvResult<Arc<HandleContext>> {
        let mut slot = self.inner.write();
        if slot.is_some() {
            return Err(UvError::AlreadyInitialized);
        }
        let context = HandleContext::new(config)?;
        *slot = Some(Arc::clone(&context));
        tracing::debug!("event loop initialized");
        Ok(context)
    }

    /// Close the loop and remove the context.
    ///
    /// Fails with `Busy` while requests, timers or servers are live and with
    /// `AlreadyRunning` when called from inside `run`.
    pub fn teardown(&self) -> UvResult<()> {
        let mut slot = self.inner.write();
        let context = slot.as_ref().ok_or(UvError::Unavailable)?;
        context.close()?;
        *slot = None;
        tracing::debug!("event loop torn down");
        Ok(())
    }

    /// The installed context, or `Unavailable`
    pub fn lookup(&self) -> UvResult<Arc<HandleContext>> {
        self.inner.read().clone().ok_or(UvError::Unavailable)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl std::fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSlot")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
