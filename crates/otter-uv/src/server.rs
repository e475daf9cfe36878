//! TCP servers
//!
//! Notify-only: each accepted connection is reported to the server's callback
//! as `{ type: "connection", from: "<ip>:<port>" }` and closed as soon as the
//! callback returns.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Weak};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

use crate::callback::{Persistent, report_exception};
use crate::context::HandleContext;
use crate::error::{NativeError, UvResult};
use crate::event_loop::LoopEvent;
use crate::value::{Function, Object, Value};

/// An accepted connection on its way to the dispatcher
#[derive(Debug)]
pub struct Accepted {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Accepted {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// A listening server. Lives until closed.
pub(crate) struct ServerRecord {
    callback: Persistent,
    task: AbortHandle,
    local_addr: SocketAddr,
    connections: u64,
}

/// Summary of a live server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    pub id: u64,
    pub local_addr: SocketAddr,
}

impl HandleContext {
    /// Bind, listen and return the script handle `{ port, close }`.
    pub fn create_tcp_server(self: &Arc<Self>, port: u16, callback: Function) -> UvResult<Value> {
        let info = self.listen_tcp(port, callback)?;
        Ok(server_handle(Arc::downgrade(self), info))
    }

    /// Bind `<bind_host>:<port>` and start accepting.
    ///
    /// Bind and listen failures are returned synchronously; the socket is
    /// dropped and no record is created.
    pub fn listen_tcp(&self, port: u16, callback: Function) -> UvResult<ServerInfo> {
        self.event_loop.ensure_open()?;
        let config = self.config();
        let requested = SocketAddr::new(config.bind_host, port);

        let listener = bind_listener(requested, config.listen_backlog).map_err(NativeError::from)?;
        let local_addr = listener.local_addr().map_err(NativeError::from)?;
        let listener = {
            let _guard = self.event_loop.enter();
            TcpListener::from_std(listener).map_err(NativeError::from)?
        };

        let id = self.servers.next_id();
        let sender = self.event_loop.sender();
        self.servers.insert_with(id, || ServerRecord {
            callback: Persistent::new(callback),
            task: self.event_loop.spawn(accept_loop(id, listener, sender)),
            local_addr,
            connections: 0,
        });
        tracing::debug!(id, %local_addr, "server listening");
        Ok(ServerInfo { id, local_addr })
    }

    /// Stop accepting and release the server's callback. Returns false if the
    /// server was already closed.
    pub fn close_server(&self, id: u64) -> bool {
        match self.servers.remove(id) {
            Some(record) => {
                record.task.abort();
                tracing::debug!(
                    id,
                    local_addr = %record.local_addr,
                    connections = record.connections,
                    "server closed"
                );
                true
            }
            None => false,
        }
    }

    /// Connections reported so far by server `id`
    pub fn server_connections(&self, id: u64) -> Option<u64> {
        self.servers.with(id, |server| server.connections)
    }

    pub(crate) fn deliver_connection(&self, id: u64, result: Result<Accepted, NativeError>) {
        let accepted = result.is_ok();
        let callback = self.servers.with(id, |server| {
            if accepted {
                server.connections += 1;
            }
            server.callback.clone()
        });
        let Some(callback) = callback else {
            tracing::trace!(id, "connection for closed server dropped");
            return;
        };

        let (event, stream) = match result {
            Ok(Accepted { stream, peer }) => {
                tracing::trace!(id, %peer, "connection accepted");
                (connection_value(peer), Some(stream))
            }
            Err(err) => {
                tracing::debug!(id, error = %err, "accept failed");
                (err.to_value(), None)
            }
        };
        let outcome = callback.invoke(&[event]);
        drop(stream);
        report_exception("Server", id, outcome);
    }
}

fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<StdTcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Pause before accepting again once the process is out of descriptors or
/// memory. The pending connection stays readable, so retrying at once spins.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// What to do after a failed `accept`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Per-connection failure: report it and keep accepting
    Report,
    /// First exhaustion error: report it, then back off
    ReportAndPause,
    /// Exhaustion persists: back off quietly
    Pause,
}

/// Reports an exhaustion episode once, however many retries it takes.
#[derive(Debug, Default)]
struct AcceptThrottle {
    exhausted: bool,
}

impl AcceptThrottle {
    fn on_error(&mut self, err: &io::Error) -> AcceptFailure {
        if !is_resource_exhaustion(err) {
            return AcceptFailure::Report;
        }
        if std::mem::replace(&mut self.exhausted, true) {
            AcceptFailure::Pause
        } else {
            AcceptFailure::ReportAndPause
        }
    }

    fn on_accept(&mut self) {
        self.exhausted = false;
    }
}

fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    ) || err.kind() == io::ErrorKind::OutOfMemory
}

async fn accept_loop(id: u64, listener: TcpListener, sender: UnboundedSender<LoopEvent>) {
    let mut throttle = AcceptThrottle::default();
    loop {
        let result = match listener.accept().await {
            Ok((stream, _)) => {
                throttle.on_accept();
                match stream.peer_addr() {
                    Ok(peer) => Ok(Accepted { stream, peer }),
                    Err(err) => {
                        tracing::debug!(id, error = %err, "peer address unavailable, connection discarded");
                        continue;
                    }
                }
            }
            Err(err) => {
                let failure = throttle.on_error(&err);
                if failure != AcceptFailure::Pause {
                    let event = LoopEvent::Connection {
                        id,
                        result: Err(NativeError::from(err)),
                    };
                    if sender.send(event).is_err() {
                        break;
                    }
                }
                if failure != AcceptFailure::Report {
                    tracing::warn!(id, backoff = ?ACCEPT_BACKOFF, "accept out of resources, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                continue;
            }
        };
        if sender.send(LoopEvent::Connection { id, result }).is_err() {
            break;
        }
    }
}

/// `{ type: "connection", from: "<ip>:<port>" }`
pub fn connection_value(peer: SocketAddr) -> Value {
    let event = Object::new();
    event.set("type", Value::from("connection"));
    event.set("from", Value::from(format!("{}:{}", peer.ip(), peer.port())));
    Value::Object(event)
}

fn server_handle(context: Weak<HandleContext>, info: ServerInfo) -> Value {
    let handle = Object::new();
    handle.set("port", Value::Number(info.local_addr.port() as f64));
    handle.set(
        "close",
        Value::Function(Function::new("close", move |_| {
            let closed = context
                .upgrade()
                .is_some_and(|context| context.close_server(info.id));
            Ok(Value::Bool(closed))
        })),
    );
    Value::Object(handle)
}
