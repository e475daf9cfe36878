//! Request records for in-flight file operations.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::NativeError;
use crate::promise::JsResolvers;
use crate::value::Value;

/// Kind of file operation a request performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Read,
    Write,
    Stat,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FsOp::Read => "read",
            FsOp::Write => "write",
            FsOp::Stat => "stat",
        })
    }
}

/// Successful result of a file operation, before it becomes a script value
#[derive(Debug)]
pub enum FsOutcome {
    /// Exactly the bytes read
    Read(Vec<u8>),
    /// Number of bytes written
    Written(usize),
    Stat(StatInfo),
}

impl FsOutcome {
    pub fn op(&self) -> FsOp {
        match self {
            FsOutcome::Read(_) => FsOp::Read,
            FsOutcome::Written(_) => FsOp::Write,
            FsOutcome::Stat(_) => FsOp::Stat,
        }
    }
}

/// File status, times in whole seconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatInfo {
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
}

impl StatInfo {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            size: metadata.size(),
            mode: metadata.mode(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
            atime: metadata.atime(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        fn seconds(time: std::io::Result<std::time::SystemTime>) -> i64 {
            time.ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        }

        let modified = seconds(metadata.modified());
        Self {
            size: metadata.len(),
            mode: if metadata.permissions().readonly() { 0o444 } else { 0o666 },
            mtime: modified,
            ctime: seconds(metadata.created()).max(modified),
            atime: seconds(metadata.accessed()),
        }
    }
}

/// One in-flight file operation.
///
/// The record owns the settlement capability. It is either removed from the
/// context's table by the dispatcher or, when the operation never started,
/// settled by the issuing call before it is ever inserted. Both paths consume
/// the record, so it is released exactly once.
pub struct RequestRecord {
    id: u64,
    op: FsOp,
    path: PathBuf,
    resolvers: JsResolvers,
    issued_at: Instant,
}

impl RequestRecord {
    pub(crate) fn new(id: u64, op: FsOp, path: PathBuf, resolvers: JsResolvers) -> Self {
        tracing::debug!(id, %op, path = %path.display(), "request created");
        Self {
            id,
            op,
            path,
            resolvers,
            issued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn op(&self) -> FsOp {
        self.op
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn elapsed(&self) -> Duration {
        self.issued_at.elapsed()
    }

    /// Settle the promise and release the record.
    pub(crate) fn settle(self, outcome: Result<Value, NativeError>) {
        tracing::debug!(
            id = self.id,
            op = %self.op,
            ok = outcome.is_ok(),
            elapsed_us = self.elapsed().as_micros() as u64,
            "request released"
        );
        self.resolvers.settle(outcome.map_err(|err| err.to_value()));
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("id", &self.id)
            .field("op", &self.op)
            .field("path", &self.path)
            .finish()
    }
}
