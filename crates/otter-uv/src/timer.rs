//! One-shot timers

use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::callback::{OneShot, report_exception};
use crate::context::HandleContext;
use crate::error::UvResult;
use crate::event_loop::LoopEvent;
use crate::value::Function;

/// Longest accepted delay; larger values are clamped.
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

/// A pending timer. Removed from the table when it fires or is cleared.
pub(crate) struct TimerRecord {
    callback: OneShot,
    task: AbortHandle,
    delay: Duration,
}

impl HandleContext {
    /// Schedule `callback` to run once after `delay`. Returns the timer id.
    pub fn set_timeout(&self, callback: Function, delay: Duration) -> UvResult<u64> {
        self.event_loop.ensure_open()?;
        let delay = delay.min(MAX_TIMER_DELAY);
        let deadline = Instant::now() + delay;
        let id = self.timers.next_id();

        self.timers.insert_with(id, || TimerRecord {
            callback: OneShot::new(callback),
            task: self.event_loop.spawn_completion(async move {
                tokio::time::sleep_until(deadline).await;
                LoopEvent::TimerFired { id }
            }),
            delay,
        });
        tracing::debug!(id, delay_ms = delay.as_millis() as u64, "timer created");
        Ok(id)
    }

    /// Cancel a pending timer. Returns false when it already fired, was
    /// cleared, or never existed.
    pub fn clear_timeout(&self, id: u64) -> bool {
        match self.timers.remove(id) {
            Some(record) => {
                record.task.abort();
                tracing::debug!(id, "timer cleared");
                true
            }
            None => false,
        }
    }

    pub(crate) fn fire_timer(&self, id: u64) {
        let Some(record) = self.timers.remove(id) else {
            tracing::trace!(id, "fire for cleared timer ignored");
            return;
        };
        tracing::debug!(id, delay_ms = record.delay.as_millis() as u64, "timer fired");
        report_exception("Timer", id, record.callback.invoke(&[]));
    }
}
