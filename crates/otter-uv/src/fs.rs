//! File operations: read, write, stat.
//!
//! Each call creates its promise first, then a [`RequestRecord`] holding the
//! settlement capability, then spawns the chained operation. Buffers belong
//! to the operation future and move into the completion.

use std::future::Future;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::context::HandleContext;
use crate::error::NativeError;
use crate::event_loop::LoopEvent;
use crate::promise::JsPromise;
use crate::request::{FsOp, FsOutcome, RequestRecord, StatInfo};

impl HandleContext {
    /// Read a whole file. Resolves with an ArrayBuffer of exactly the bytes read.
    pub fn read_file(&self, path: &str) -> JsPromise {
        let fallback = self.config().read_buffer_size;
        self.issue_fs(FsOp::Read, path, move |path| read_chain(path, fallback))
    }

    /// Create or truncate a file and write `data`. Resolves with the byte count.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> JsPromise {
        let data = data.into();
        let mode = self.config().file_mode;
        self.issue_fs(FsOp::Write, path, move |path| write_chain(path, data, mode))
    }

    /// Resolves with `{ size, mode, mtime, ctime, atime }`.
    pub fn stat(&self, path: &str) -> JsPromise {
        self.issue_fs(FsOp::Stat, path, stat_chain)
    }

    fn issue_fs<F, Fut>(&self, op: FsOp, path: &str, start: F) -> JsPromise
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<FsOutcome, NativeError>> + Send + 'static,
    {
        let (promise, resolvers) = JsPromise::with_resolvers();
        let id = self.requests.next_id();
        let record = RequestRecord::new(id, op, PathBuf::from(path), resolvers);

        if let Err(err) = self.check_issue(path) {
            tracing::debug!(id, %op, error = %err, "request failed to start");
            record.settle(Err(err));
            return promise;
        }

        let operation = start(record.path().to_path_buf());
        self.requests.insert(id, record);
        self.event_loop.spawn_completion(async move {
            LoopEvent::Fs {
                id,
                outcome: operation.await,
            }
        });
        promise
    }

    /// Failures detected before anything is handed to the loop.
    fn check_issue(&self, path: &str) -> Result<(), NativeError> {
        if self.event_loop.is_closed() {
            return Err(NativeError::canceled());
        }
        if path.contains('\0') {
            return Err(NativeError::invalid_argument());
        }
        Ok(())
    }
}

/// open, probe size, allocate, read until full or EOF.
async fn read_chain(path: PathBuf, fallback: usize) -> Result<FsOutcome, NativeError> {
    let mut file = tokio::fs::File::open(&path).await?;
    let probed = match file.metadata().await {
        Ok(metadata) => usize::try_from(metadata.len()).unwrap_or(usize::MAX),
        Err(_) => 0,
    };
    let capacity = if probed == 0 { fallback } else { probed };

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| NativeError::out_of_memory())?;
    buffer.resize(capacity, 0);

    let mut filled = 0;
    while filled < capacity {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buffer.truncate(filled);
    Ok(FsOutcome::Read(buffer))
}

async fn write_chain(path: PathBuf, data: Vec<u8>, mode: u32) -> Result<FsOutcome, NativeError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&path).await?;
    file.write_all(&data).await?;
    file.flush().await?;
    Ok(FsOutcome::Written(data.len()))
}

async fn stat_chain(path: PathBuf) -> Result<FsOutcome, NativeError> {
    let metadata = tokio::fs::metadata(&path).await?;
    Ok(FsOutcome::Stat(StatInfo::from_metadata(&metadata)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UvConfig;
    use crate::event_loop::RunMode;
    use crate::promise::PromiseState;
    use crate::value::Value;

    #[test]
    fn test_nul_in_path_rejects_before_issue() {
        let context = HandleContext::new(UvConfig::default()).unwrap();
        let promise = context.read_file("bad\0path");

        assert_eq!(context.live_requests(), 0);
        match promise.state() {
            PromiseState::Rejected(error) => assert_eq!(
                error.get("code").and_then(|v| v.as_number()),
                Some(-libc::EINVAL as f64)
            ),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_loop_rejects_with_canceled() {
        let context = HandleContext::new(UvConfig::default()).unwrap();
        context.close().unwrap();
        let promise = context.stat(".");
        assert_eq!(context.live_requests(), 0);
        match promise.state() {
            PromiseState::Rejected(error) => assert_eq!(
                error.get("name").and_then(|v| v.as_str().map(str::to_string)),
                Some("ECANCELED".to_string())
            ),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_reads_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let context = HandleContext::new(UvConfig::default()).unwrap();
        let promise = context.read_file(path.to_str().unwrap());
        assert!(promise.is_pending());
        assert_eq!(context.live_requests(), 1);

        assert_eq!(context.run(RunMode::Default).unwrap(), 0);
        match promise.state() {
            PromiseState::Fulfilled(Value::ArrayBuffer(buffer)) => assert!(buffer.is_empty()),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    // procfs reports size 0 for files that do have content.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_zero_size_probe_reads_into_fallback_buffer() {
        let source = "/proc/self/stat";
        if std::fs::metadata(source).map(|m| m.len()).unwrap_or(1) != 0 {
            return;
        }

        let context = HandleContext::new(UvConfig::default()).unwrap();
        let promise = context.read_file(source);
        assert_eq!(context.run(RunMode::Default).unwrap(), 0);
        match promise.state() {
            PromiseState::Fulfilled(Value::ArrayBuffer(buffer)) => {
                assert!(!buffer.is_empty());
                assert!(buffer.len() <= 4096);
            }
            other => panic!("unexpected state: {:?}", other),
        }

        let context = HandleContext::new(UvConfig::new().read_buffer_size(8)).unwrap();
        let promise = context.read_file(source);
        assert_eq!(context.run(RunMode::Default).unwrap(), 0);
        match promise.state() {
            PromiseState::Fulfilled(Value::ArrayBuffer(buffer)) => assert_eq!(buffer.len(), 8),
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
