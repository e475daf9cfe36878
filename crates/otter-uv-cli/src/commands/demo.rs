//! Demo command - walk through file I/O, timer chains, a TCP server and
//! concurrent operations on one loop.

use std::net::{Ipv4Addr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use otter_uv::{Function, Object, Value};
use parking_lot::Mutex;

use super::{Session, call_export, describe, path_value};

#[derive(Args)]
pub struct DemoCommand {
    /// Directory for demo files (defaults to a fresh temp directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Port for the TCP part (0 picks a free port)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,
}

impl DemoCommand {
    pub fn run(&self, session: &Session) -> Result<()> {
        let scratch;
        let dir = match &self.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.as_path()
            }
            None => {
                scratch = tempfile::tempdir()?;
                scratch.path()
            }
        };

        file_operations(session, dir)?;
        timer_chain(session)?;
        tcp_server(session, self.port)?;
        concurrency(session, dir)?;
        println!("\ndemo complete");
        Ok(())
    }
}

fn file_operations(session: &Session, dir: &Path) -> Result<()> {
    println!("\n=== 1: file operations ===\n");
    let path = dir.join("demo.txt");

    let written = session.settle(session.call(
        "fsWrite",
        &[path_value(&path)?, Value::from("Hello otter-uv!")],
    )?)?;
    println!("bytes written: {}", written.as_number().unwrap_or_default());

    let data = session.settle(session.call("fsRead", &[path_value(&path)?])?)?;
    let text = data
        .as_array_buffer()
        .map(|buffer| String::from_utf8_lossy(buffer.as_bytes()).into_owned())
        .unwrap_or_default();
    println!("read back: {}", text.trim());
    Ok(())
}

/// Print `label` after `delay` ms, then call `then` from inside the callback.
fn after(uv: &Object, delay: u64, label: &'static str, then: Option<Function>) -> Result<()> {
    let callback = Function::new(label, move |_| {
        println!("{}", label);
        match &then {
            Some(next) => next.call(&[]),
            None => Ok(Value::Undefined),
        }
    });
    call_export(uv, "setTimeout", &[Value::Function(callback), Value::Number(delay as f64)])?;
    Ok(())
}

fn timer_chain(session: &Session) -> Result<()> {
    println!("\n=== 2: timer chain ===\n");
    let uv = session.exports().clone();

    let third = {
        let uv = uv.clone();
        Function::new("third", move |_| {
            after(&uv, 200, "step 3: 200 ms later", None)
                .map_err(|err| Value::from(err.to_string()))?;
            Ok(Value::Undefined)
        })
    };
    let second = {
        let uv = uv.clone();
        Function::new("second", move |_| {
            after(&uv, 300, "step 2: 300 ms later", Some(third.clone()))
                .map_err(|err| Value::from(err.to_string()))?;
            Ok(Value::Undefined)
        })
    };
    after(&uv, 500, "step 1: after 500 ms", Some(second))?;

    let started = Instant::now();
    session.run()?;
    println!("chain finished in {} ms", started.elapsed().as_millis());
    Ok(())
}

fn tcp_server(session: &Session, port: u16) -> Result<()> {
    println!("\n=== 3: TCP server + timer ===\n");

    let on_connection = Function::new("onConnection", |args| {
        let event = args.first().cloned().unwrap_or_default();
        match event.get("from") {
            Some(from) => println!("new connection: {}", from.as_str().unwrap_or("?")),
            None => println!("accept failed: {}", describe(&event)),
        }
        Ok(Value::Undefined)
    });
    let server = session.call(
        "createTCPServer",
        &[Value::Number(port as f64), Value::Function(on_connection)],
    )?;
    let port = server.get("port").and_then(|p| p.as_number()).unwrap_or_default() as u16;
    println!("listening on port {}", port);

    let shutdown = {
        let uv = session.exports().clone();
        let server = Arc::new(Mutex::new(Some(server)));
        Function::new("shutdown", move |_| {
            println!("demo finished, closing server");
            if let Some(server) = server.lock().take()
                && let Some(close) = server.get("close")
                && let Some(close) = close.as_function()
            {
                close.call(&[])?;
            }
            call_export(&uv, "stop", &[]).map_err(|err| Value::from(err.to_string()))?;
            Ok(Value::Undefined)
        })
    };
    session.call("setTimeout", &[Value::Function(shutdown), Value::Number(1000.0)])?;

    let clients = thread::spawn(move || {
        for _ in 0..2 {
            match TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
                Ok(stream) => drop(stream),
                Err(err) => eprintln!("client connect failed: {}", err),
            }
            thread::sleep(Duration::from_millis(200));
        }
    });

    session.run()?;
    if clients.join().is_err() {
        anyhow::bail!("demo client thread panicked");
    }
    Ok(())
}

fn concurrency(session: &Session, dir: &Path) -> Result<()> {
    println!("\n=== 4: concurrent operations ===\n");
    let started = Instant::now();

    let mut promises = Vec::new();
    for i in 1..=3 {
        let path = dir.join(format!("file{}.txt", i));
        promises.push(session.call(
            "fsWrite",
            &[path_value(&path)?, Value::from(format!("File {}", i))],
        )?);
    }
    promises.push(session.call("fsRead", &[path_value(&dir.join("demo.txt"))?])?);

    let mut results = Vec::new();
    for promise in promises {
        let value = session.settle(promise)?;
        results.push(match value {
            Value::Number(n) => format!("{} bytes", n),
            Value::ArrayBuffer(buffer) => format!("data ({} bytes)", buffer.len()),
            other => other.type_name().to_string(),
        });
    }

    println!("completed in {} ms", started.elapsed().as_millis());
    println!("results: [{}]", results.join(", "));
    Ok(())
}
