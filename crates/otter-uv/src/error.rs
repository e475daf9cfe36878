//! Error types for otter-uv
//!
//! Two channels: [`UvError`] is returned synchronously from an op (and thrown
//! into the script), [`NativeError`] is the errno-carrying failure that rejects
//! an already-created promise.

use std::io;

use thiserror::Error;

use crate::value::{Object, Value};

/// libuv reports end-of-file with its own code outside the errno range.
pub const UV_EOF: i32 = -4095;

/// A failure reported by a native operation (open, read, bind, accept...).
///
/// `code` follows the libuv convention: the negated errno value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct NativeError {
    /// Negative errno (or [`UV_EOF`])
    pub code: i32,
    /// Symbolic errno name, e.g. `ENOENT`
    pub name: &'static str,
    /// Human-readable text derived from the code
    pub message: String,
}

impl NativeError {
    /// Build an error from a positive errno value.
    pub fn from_errno(errno: i32) -> Self {
        match errno_info(errno) {
            Some((name, message)) => Self {
                code: -errno,
                name,
                message: message.to_string(),
            },
            None => Self {
                code: -errno,
                name: "UNKNOWN",
                message: format!("unknown error {}", errno),
            },
        }
    }

    /// Allocation of a record buffer failed after the promise existed.
    pub fn out_of_memory() -> Self {
        Self::from_errno(libc::ENOMEM)
    }

    /// Invalid argument detected while issuing an operation.
    pub fn invalid_argument() -> Self {
        Self::from_errno(libc::EINVAL)
    }

    /// The loop was closed before the operation could be issued.
    pub fn canceled() -> Self {
        Self::from_errno(libc::ECANCELED)
    }

    /// Build the script-visible error object: `{ name, code, message }`.
    pub fn to_value(&self) -> Value {
        let error = Object::new();
        error.set("name", Value::from(self.name));
        error.set("code", Value::Number(self.code as f64));
        error.set("message", Value::from(format!("{}: {}", self.name, self.message)));
        Value::Object(error)
    }
}

impl From<io::Error> for NativeError {
    fn from(err: io::Error) -> Self {
        #[cfg(unix)]
        if let Some(errno) = err.raw_os_error() {
            return match errno_info(errno) {
                Some(_) => Self::from_errno(errno),
                None => Self {
                    code: -errno,
                    name: "UNKNOWN",
                    message: err.to_string(),
                },
            };
        }

        let errno = match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                return Self {
                    code: UV_EOF,
                    name: "EOF",
                    message: "end of file".to_string(),
                };
            }
            io::ErrorKind::NotFound => libc::ENOENT,
            io::ErrorKind::PermissionDenied => libc::EACCES,
            io::ErrorKind::AlreadyExists => libc::EEXIST,
            io::ErrorKind::InvalidInput => libc::EINVAL,
            io::ErrorKind::OutOfMemory => libc::ENOMEM,
            io::ErrorKind::AddrInUse => libc::EADDRINUSE,
            io::ErrorKind::AddrNotAvailable => libc::EADDRNOTAVAIL,
            io::ErrorKind::ConnectionAborted => libc::ECONNABORTED,
            io::ErrorKind::ConnectionReset => libc::ECONNRESET,
            io::ErrorKind::ConnectionRefused => libc::ECONNREFUSED,
            io::ErrorKind::BrokenPipe => libc::EPIPE,
            io::ErrorKind::TimedOut => libc::ETIMEDOUT,
            io::ErrorKind::WouldBlock => libc::EAGAIN,
            _ => libc::EIO,
        };
        Self::from_errno(errno)
    }
}

/// Name and libuv message for the errno values this bridge can produce.
fn errno_info(errno: i32) -> Option<(&'static str, &'static str)> {
    let info = match errno {
        libc::ENOENT => ("ENOENT", "no such file or directory"),
        libc::EACCES => ("EACCES", "permission denied"),
        libc::EPERM => ("EPERM", "operation not permitted"),
        libc::EEXIST => ("EEXIST", "file already exists"),
        libc::EISDIR => ("EISDIR", "illegal operation on a directory"),
        libc::ENOTDIR => ("ENOTDIR", "not a directory"),
        libc::EINVAL => ("EINVAL", "invalid argument"),
        libc::ENOMEM => ("ENOMEM", "not enough memory"),
        libc::EMFILE => ("EMFILE", "too many open files"),
        libc::ENFILE => ("ENFILE", "file table overflow"),
        libc::ENOBUFS => ("ENOBUFS", "no buffer space available"),
        libc::EBADF => ("EBADF", "bad file descriptor"),
        libc::ENOSPC => ("ENOSPC", "no space left on device"),
        libc::EROFS => ("EROFS", "read-only file system"),
        libc::EIO => ("EIO", "i/o error"),
        libc::EADDRINUSE => ("EADDRINUSE", "address already in use"),
        libc::EADDRNOTAVAIL => ("EADDRNOTAVAIL", "address not available"),
        libc::ECONNABORTED => ("ECONNABORTED", "software caused connection abort"),
        libc::ECONNRESET => ("ECONNRESET", "connection reset by peer"),
        libc::ECONNREFUSED => ("ECONNREFUSED", "connection refused"),
        libc::EPIPE => ("EPIPE", "broken pipe"),
        libc::ETIMEDOUT => ("ETIMEDOUT", "connection timed out"),
        libc::EAGAIN => ("EAGAIN", "resource temporarily unavailable"),
        libc::ECANCELED => ("ECANCELED", "operation canceled"),
        _ => return None,
    };
    Some(info)
}

/// Errors returned synchronously by bridge operations
#[derive(Error, Debug)]
pub enum UvError {
    /// Script-level argument validation failed
    #[error("TypeError: {0}")]
    TypeError(String),

    /// No context has been initialized for this runtime (or it was torn down)
    #[error("Event loop not available")]
    Unavailable,

    /// The runtime already has a context installed
    #[error("Event loop already initialized")]
    AlreadyInitialized,

    /// The context's loop has been closed
    #[error("Event loop is closed")]
    LoopClosed,

    /// `run` was called while the loop was already being driven
    #[error("Event loop is already running")]
    AlreadyRunning,

    /// Teardown was requested while records were still live
    #[error("Event loop busy: {requests} requests, {timers} timers, {servers} servers still live")]
    Busy {
        /// Live request records
        requests: usize,
        /// Live timer records
        timers: usize,
        /// Live server records
        servers: usize,
    },

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The underlying loop could not be created
    #[error("Failed to create event loop: {0}")]
    LoopCreation(#[source] io::Error),

    /// A native operation failed before any promise existed
    #[error(transparent)]
    Native(#[from] NativeError),

    /// Internal consistency violation (a completion without a record)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UvError {
    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Convert into the value thrown into the script.
    pub fn to_value(&self) -> Value {
        match self {
            UvError::Native(native) => native.to_value(),
            UvError::TypeError(message) => {
                let error = Object::new();
                error.set("name", Value::from("TypeError"));
                error.set("message", Value::from(message.as_str()));
                Value::Object(error)
            }
            other => {
                let error = Object::new();
                error.set("name", Value::from("Error"));
                error.set("message", Value::from(other.to_string()));
                Value::Object(error)
            }
        }
    }
}

/// Result type alias for bridge operations
pub type UvResult<T> = Result<T, UvError>;
