//! Serve command - report incoming TCP connections.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use otter_uv::{Function, Object, Value};
use parking_lot::Mutex;

use super::{Session, call_export, describe};

#[derive(Args)]
pub struct ServeCommand {
    /// Port to listen on (0 picks a free port)
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Close the server after this many connections
    #[arg(long)]
    pub max_connections: Option<u64>,
}

impl ServeCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        let server: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let on_connection = connection_printer(
            session.exports().clone(),
            Arc::clone(&server),
            self.max_connections,
        );

        let handle = session.call(
            "createTCPServer",
            &[Value::Number(self.port as f64), Value::Function(on_connection)],
        )?;
        let port = handle.get("port").and_then(|p| p.as_number()).unwrap_or_default();
        *server.lock() = Some(handle.clone());
        println!("listening on port {}", port);

        let status = session.run()?;
        tracing::debug!(status, "loop returned");

        // Stopped with the server still open: release it before teardown.
        if let Some(close) = handle.get("close").as_ref().and_then(Value::as_function) {
            close.call(&[]).map_err(|thrown| anyhow::anyhow!(describe(&thrown)))?;
        }
        server.lock().take();
        Ok(())
    }
}

fn connection_printer(
    uv: Object,
    server: Arc<Mutex<Option<Value>>>,
    max_connections: Option<u64>,
) -> Function {
    let seen = Mutex::new(0u64);
    Function::new("onConnection", move |args| {
        let event = args.first().cloned().unwrap_or_default();
        if event.get("type").as_ref().and_then(Value::as_str) != Some("connection") {
            eprintln!("accept failed: {}", describe(&event));
            return Ok(Value::Undefined);
        }

        let count = {
            let mut seen = seen.lock();
            *seen += 1;
            *seen
        };
        let from = event.get("from").unwrap_or_default();
        println!("connection #{} from {}", count, from.as_str().unwrap_or("?"));

        if max_connections.is_some_and(|max| count >= max) {
            let handle = server.lock().clone();
            if let Some(close) = handle.and_then(|h| h.get("close"))
                && let Some(close) = close.as_function()
            {
                close.call(&[])?;
            }
            call_export(&uv, "stop", &[]).map_err(|err| Value::from(err.to_string()))?;
        }
        Ok(Value::Undefined)
    })
}
