//! Append-Only File (AOF) Module
//!
//! Durable, replayable log of protocol values.
//!
//! ## Responsibilities
//! - Append values (typically commands) in their wire encoding
//! - Flush according to a sync policy: never, always, or every second
//! - Replay the file through the same reader used for network input
//! - Verify and repair a torn tail after a crash
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ *3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n  │  value 1
//! ├─────────────────────────────────────────┤
//! │ *2\r\n$3\r\nDEL\r\n$1\r\nk\r\n             │  value 2
//! ├─────────────────────────────────────────┤
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```
//! No headers, checksums or separators: the file is a plain RESP stream.

mod policy;
mod file;
mod flusher;
mod recovery;

pub use policy::SyncPolicy;
pub use file::{Aof, DEFAULT_FLUSH_INTERVAL};
pub use recovery::{AofRecovery, RecoveryResult};
