//! AOF Recovery
//!
//! Offline inspection and repair of a log left behind by a crash.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{RespError, Result};
use crate::protocol::{Reader, Value};

/// Handles AOF verification and repair after a crash
pub struct AofRecovery;

/// Outcome of reading a log to its end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of complete values found
    pub values_recovered: u64,

    /// Byte offset just past the last complete value
    pub valid_len: u64,

    /// Size of the file when it was read
    pub file_len: u64,

    /// Why reading stopped before `file_len`, if it did
    pub tail_error: Option<String>,

    /// Whether the file was truncated to `valid_len`
    pub was_truncated: bool,
}

impl RecoveryResult {
    /// True when the whole file decoded without a torn or corrupt tail
    pub fn is_clean(&self) -> bool {
        self.tail_error.is_none()
    }

    /// Bytes after the last complete value
    pub fn trailing_bytes(&self) -> u64 {
        self.file_len - self.valid_len
    }
}

impl AofRecovery {
    /// Report how much of the log is intact, without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        replay(path, |_| {})
    }

    /// Truncate a torn or corrupt tail, keeping every complete value before it
    pub fn repair(path: &Path) -> Result<RecoveryResult> {
        let mut result = replay(path, |_| {})?;
        truncate_tail(path, &mut result)?;
        Ok(result)
    }

    /// Load every complete value, then truncate whatever follows them
    ///
    /// This is the truncate-and-continue policy: after it returns, the log can
    /// be reopened and appended to as if the crash never happened.
    pub fn recover(path: &Path) -> Result<(Vec<Value>, RecoveryResult)> {
        let mut values = Vec::new();
        let mut result = replay(path, |value| values.push(value))?;
        truncate_tail(path, &mut result)?;
        Ok((values, result))
    }
}

fn replay<F>(path: &Path, mut visit: F) -> Result<RecoveryResult>
where
    F: FnMut(Value),
{
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = Reader::new(file);

    let mut result = RecoveryResult {
        values_recovered: 0,
        valid_len: 0,
        file_len,
        tail_error: None,
        was_truncated: false,
    };

    loop {
        match reader.read_value() {
            Ok(Some((value, len))) => {
                result.values_recovered += 1;
                result.valid_len += len as u64;
                visit(value);
            }
            Ok(None) => break,
            Err(e @ (RespError::UnexpectedEof | RespError::Protocol(_))) => {
                result.tail_error = Some(e.to_string());
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(result)
}

fn truncate_tail(path: &Path, result: &mut RecoveryResult) -> Result<()> {
    if result.is_clean() {
        return Ok(());
    }

    tracing::warn!(
        "Truncating AOF {} from {} to {} bytes ({})",
        path.display(),
        result.file_len,
        result.valid_len,
        result.tail_error.as_deref().unwrap_or("corrupt tail"),
    );

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(result.valid_len)?;
    file.sync_all()?;
    result.was_truncated = true;
    Ok(())
}
