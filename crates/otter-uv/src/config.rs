//! Configuration for the async-operation bridge.

use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

use crate::error::{UvError, UvResult};

/// Buffer used for reads when the probed file size is zero or unknown.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
/// Backlog passed to `listen`.
pub const DEFAULT_LISTEN_BACKLOG: i32 = 128;
/// Permission bits for files created by writes.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Upper bound on tokio's blocking pool (file I/O runs there).
pub const DEFAULT_BLOCKING_THREADS: usize = 64;

/// Bridge settings.
///
/// Every field has a default, so a partial `[uv]` table deserializes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UvConfig {
    /// Read buffer size used when a file's size cannot be probed.
    /// Default: 4096
    pub read_buffer_size: usize,

    /// Listen backlog for TCP servers.
    /// Default: 128
    pub listen_backlog: i32,

    /// Address TCP servers bind to.
    /// Default: 0.0.0.0
    pub bind_host: IpAddr,

    /// Mode for files created by writes (unix only).
    /// Default: 0o644
    pub file_mode: u32,

    /// Maximum threads in the blocking pool.
    /// Default: 64
    pub blocking_threads: usize,
}

impl Default for UvConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            file_mode: DEFAULT_FILE_MODE,
            blocking_threads: DEFAULT_BLOCKING_THREADS,
        }
    }
}

impl UvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback read buffer size (clamped to at least one byte).
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    pub fn blocking_threads(mut self, threads: usize) -> Self {
        self.blocking_threads = threads.max(1);
        self
    }

    /// Reject values the builder would have clamped or that the OS cannot
    /// take. Deserialized configs bypass the setters, so contexts call this
    /// before building their loop.
    pub fn validate(&self) -> UvResult<()> {
        if self.read_buffer_size == 0 {
            return Err(UvError::invalid_config("read_buffer_size must be at least 1"));
        }
        if self.blocking_threads == 0 {
            return Err(UvError::invalid_config("blocking_threads must be at least 1"));
        }
        if self.listen_backlog < 0 {
            return Err(UvError::invalid_config(format!(
                "listen_backlog must not be negative (got {})",
                self.listen_backlog
            )));
        }
        if self.file_mode > 0o7777 {
            return Err(UvError::invalid_config(format!(
                "file_mode {:o} has bits outside 0o7777",
                self.file_mode
            )));
        }
        Ok(())
    }
}
