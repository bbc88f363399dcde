//! Append-only log
//!
//! Persists values in their wire encoding with a selectable sync policy.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{RespError, Result};
use crate::protocol::{Reader, Value};
use super::flusher::Flusher;
use super::SyncPolicy;

/// Default interval of the every-second policy
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// State behind the log's single lock
pub(super) struct State {
    /// `None` once closed
    file: Option<File>,

    policy: SyncPolicy,

    /// Bytes written since the last flush
    pub(super) dirty: bool,
}

impl State {
    pub(super) fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

pub(super) type SharedState = Arc<Mutex<State>>;

/// A durable append-only log of values
///
/// ## Concurrency
/// - `append`/`append_multi` take `&self` and may be called from many threads;
///   each batch is written under one lock, so batches never interleave
/// - `flusher` is only locked while changing policy or closing, always
///   before `state`, which keeps lock order fixed
///
/// ## On-disk format
/// The concatenated wire encoding of every appended value, with no extra
/// framing. A [`Reader`] replays the file like any other RESP stream.
pub struct Aof {
    path: PathBuf,
    interval: Duration,
    state: SharedState,
    flusher: Mutex<Option<Flusher>>,
}

impl Aof {
    /// Open or create the log at `path` with [`SyncPolicy::Never`]
    ///
    /// Existing content is kept; new values are appended after it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, SyncPolicy::Never, DEFAULT_FLUSH_INTERVAL)
    }

    /// Open or create the log at `path` with an explicit policy
    ///
    /// `interval` is the flush period used whenever the policy is
    /// [`SyncPolicy::EverySecond`].
    pub fn open_with(
        path: impl AsRef<Path>,
        policy: SyncPolicy,
        interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        tracing::debug!("Opened AOF {}", path.display());

        let aof = Self {
            path,
            interval,
            state: Arc::new(Mutex::new(State {
                file: Some(file),
                policy: SyncPolicy::Never,
                dirty: false,
            })),
            flusher: Mutex::new(None),
        };
        aof.set_sync_policy(policy)?;
        Ok(aof)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> SyncPolicy {
        self.state.lock().policy
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append one value
    pub fn append(&self, value: &Value) -> Result<()> {
        self.write(&value.marshal())
    }

    /// Append a batch of values as one contiguous write
    pub fn append_multi(&self, values: &[Value]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(values.iter().map(Value::encoded_len).sum());
        for value in values {
            value.marshal_into(&mut buf);
        }
        self.write(&buf)
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state.file.as_mut().ok_or(RespError::Closed)?;

        file.write_all(bytes)?;
        match state.policy {
            SyncPolicy::Always => file.sync_data()?,
            _ => state.dirty = true,
        }
        Ok(())
    }

    /// Force everything written so far to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state.file.as_ref().ok_or(RespError::Closed)?;
        file.sync_data()?;
        state.dirty = false;
        Ok(())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Replay every value in file order
    ///
    /// The file length is captured under the write lock and only that prefix
    /// is read, through a separate handle. Concurrent appends are neither
    /// blocked nor observed half-written, and `visit` may append itself.
    ///
    /// A torn or corrupt trailing record is returned as an error after every
    /// value before it has been visited.
    pub fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Value),
    {
        let len = {
            let state = self.state.lock();
            let file = state.file.as_ref().ok_or(RespError::Closed)?;
            file.metadata()?.len()
        };

        let mut reader = Reader::new(File::open(&self.path)?.take(len));
        while let Some((value, _)) = reader.read_value()? {
            visit(value);
        }
        Ok(())
    }

    // =========================================================================
    // Policy and lifecycle
    // =========================================================================

    /// Switch the sync policy, starting or stopping the background flusher
    ///
    /// [`SyncPolicy::Unknown`] leaves the current policy in place.
    pub fn set_sync_policy(&self, policy: SyncPolicy) -> Result<()> {
        let mut flusher = self.flusher.lock();

        let flusher_file = {
            let mut state = self.state.lock();
            let file = state.file.as_ref().ok_or(RespError::Closed)?;
            if policy == SyncPolicy::Unknown {
                tracing::warn!("Ignoring unknown AOF sync policy");
                return Ok(());
            }
            let clone = match (policy, flusher.is_none()) {
                (SyncPolicy::EverySecond, true) => Some(file.try_clone()?),
                _ => None,
            };
            state.policy = policy;
            clone
        };

        if let Some(file) = flusher_file {
            *flusher = Some(Flusher::spawn(Arc::clone(&self.state), file, self.interval)?);
        } else if policy != SyncPolicy::EverySecond {
            if let Some(running) = flusher.take() {
                running.stop();
            }
        }

        tracing::debug!("AOF {} sync policy: {}", self.path.display(), policy);
        Ok(())
    }

    /// Stop background flushing, flush, and close the file
    ///
    /// A second call returns [`RespError::Closed`], as does every other
    /// operation afterwards.
    pub fn close(&self) -> Result<()> {
        let mut flusher = self.flusher.lock();
        if let Some(running) = flusher.take() {
            running.stop();
        }

        let file = {
            let mut state = self.state.lock();
            state.dirty = false;
            state.file.take().ok_or(RespError::Closed)?
        };
        file.sync_all()?;

        tracing::debug!("Closed AOF {}", self.path.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        !self.state.lock().is_open()
    }

    /// True while appended bytes have not yet been fsynced
    pub fn has_unsynced_writes(&self) -> bool {
        self.state.lock().dirty
    }
}

impl Drop for Aof {
    fn drop(&mut self) {
        match self.close() {
            Ok(()) | Err(RespError::Closed) => {}
            Err(e) => tracing::warn!("Failed to close AOF {}: {}", self.path.display(), e),
        }
    }
}
