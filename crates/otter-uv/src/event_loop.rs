//! Event loop
//!
//! A current-thread tokio runtime plays the part of the cooperative loop.
//! Operation futures are spawned onto it but only make progress while the
//! loop is being driven; each one reports back with a [`LoopEvent`] sent on
//! the completion channel, and the driver dispatches those one at a time on
//! the calling thread.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::{Builder, EnterGuard, Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;

use crate::config::UvConfig;
use crate::error::{NativeError, UvError, UvResult};
use crate::request::FsOutcome;
use crate::server::Accepted;

/// How [`HandleContext::run`](crate::HandleContext::run) drives the loop.
///
/// Mirrors libuv's `uv_run_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run until no record is live or `stop` is called
    #[default]
    Default,
    /// Wait for at least one completion, dispatch what is ready, return
    Once,
    /// Dispatch whatever is ready without waiting
    NoWait,
}

impl RunMode {
    /// Parse the script-facing mode name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "default" => Some(RunMode::Default),
            "once" => Some(RunMode::Once),
            "nowait" => Some(RunMode::NoWait),
            _ => None,
        }
    }
}

/// A completion delivered by an in-flight operation
#[derive(Debug)]
pub enum LoopEvent {
    /// A file request finished
    Fs {
        id: u64,
        outcome: Result<FsOutcome, NativeError>,
    },
    /// A timer's delay elapsed
    TimerFired { id: u64 },
    /// A server accepted (or failed to accept) a connection
    Connection {
        id: u64,
        result: Result<Accepted, NativeError>,
    },
    /// Unblocks a waiting driver so it can observe a stop request
    Wakeup,
}

/// The loop owned by a handle context
pub struct EventLoop {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    sender: UnboundedSender<LoopEvent>,
    /// Taken by the driver for the duration of a run
    receiver: Mutex<Option<UnboundedReceiver<LoopEvent>>>,
    stop_requested: AtomicBool,
    closed: AtomicBool,
}

impl EventLoop {
    /// Build the loop. Nothing is started until the loop is driven.
    pub fn new(config: &UvConfig) -> UvResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(config.blocking_threads.max(1))
            .thread_name("otter-uv-blocking")
            .build()
            .map_err(UvError::LoopCreation)?;
        let handle = runtime.handle().clone();
        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            sender,
            receiver: Mutex::new(Some(receiver)),
            stop_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True while a driver holds the completion channel
    pub fn is_running(&self) -> bool {
        self.receiver.lock().is_none()
    }

    pub(crate) fn ensure_open(&self) -> UvResult<()> {
        if self.is_closed() {
            return Err(UvError::LoopClosed);
        }
        Ok(())
    }

    /// Spawn an operation whose single result is a completion event.
    pub(crate) fn spawn_completion<F>(&self, operation: F) -> AbortHandle
    where
        F: Future<Output = LoopEvent> + Send + 'static,
    {
        let sender = self.sender.clone();
        self.spawn(async move {
            // A closed loop has dropped its receiver; nothing is left to notify.
            let _ = sender.send(operation.await);
        })
    }

    /// Spawn a task that reports through its own sender (accept loops).
    pub(crate) fn spawn<F>(&self, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task).abort_handle()
    }

    pub(crate) fn sender(&self) -> UnboundedSender<LoopEvent> {
        self.sender.clone()
    }

    /// Enter the runtime context, needed to register sockets with its reactor.
    pub(crate) fn enter(&self) -> EnterGuard<'_> {
        self.handle.enter()
    }

    /// Hand the completion channel to a driver. Fails if another run holds it.
    pub(crate) fn acquire(&self) -> UvResult<UnboundedReceiver<LoopEvent>> {
        self.ensure_open()?;
        self.receiver.lock().take().ok_or(UvError::AlreadyRunning)
    }

    pub(crate) fn release(&self, receiver: UnboundedReceiver<LoopEvent>) {
        *self.receiver.lock() = Some(receiver);
    }

    /// Drive spawned work until the next completion arrives.
    pub(crate) fn wait_event(
        &self,
        receiver: &mut UnboundedReceiver<LoopEvent>,
    ) -> UvResult<Option<LoopEvent>> {
        let runtime = self.runtime.lock();
        let runtime = runtime.as_ref().ok_or(UvError::LoopClosed)?;
        Ok(runtime.block_on(receiver.recv()))
    }

    /// Give spawned work a single turn, then take a completion if one is ready.
    pub(crate) fn poll_event(
        &self,
        receiver: &mut UnboundedReceiver<LoopEvent>,
    ) -> UvResult<Option<LoopEvent>> {
        let runtime = self.runtime.lock();
        let runtime = runtime.as_ref().ok_or(UvError::LoopClosed)?;
        Ok(runtime.block_on(async {
            tokio::task::yield_now().await;
            receiver.try_recv().ok()
        }))
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.sender.send(LoopEvent::Wakeup);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn reset_stop(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    /// Mark the loop closed and shut the runtime down. Tasks still spawned are
    /// dropped without being polled again.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("closed", &self.is_closed())
            .field("running", &self.is_running())
            .finish()
    }
}
