//! Sleep command - schedule a timer and report when it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use otter_uv::{Function, Value};

use super::Session;

#[derive(Args)]
pub struct SleepCommand {
    /// Delay in milliseconds
    #[arg(default_value_t = 1000)]
    pub millis: u64,
}

impl SleepCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        let fired = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let callback = {
            let fired = Arc::clone(&fired);
            Function::new("wake", move |_| {
                fired.store(true, Ordering::SeqCst);
                Ok(Value::Undefined)
            })
        };
        let id = session.call(
            "setTimeout",
            &[Value::Function(callback), Value::Number(self.millis as f64)],
        )?;
        tracing::debug!(id = ?id, millis = self.millis, "timer scheduled");

        let status = session.run()?;
        if !fired.load(Ordering::SeqCst) {
            anyhow::bail!("loop returned {} before the timer fired", status);
        }
        println!(
            "timer fired after {} ms",
            started.elapsed().as_millis()
        );
        Ok(())
    }
}
