//! # respwire
//!
//! A binary-safe RESP (REdis Serialization Protocol) codec with:
//! - A streaming reader that tolerates arbitrary fragmentation
//! - Inline ("telnet") command fallback
//! - Zero-copy decoded values that re-marshal to their exact input bytes
//! - A crash-safe append-only log with never/always/every-second fsync
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (command table, one thread/conn)               │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ read_multi_bulk              │ write_*
//!                ▼                              ▼
//!         ┌─────────────┐               ┌─────────────┐
//!         │   Reader    │               │   Writer    │
//!         │ (streaming) │               │             │
//!         └──────┬──────┘               └──────┬──────┘
//!                │                             │
//!                └──────────┐    ┌─────────────┘
//!                           ▼    ▼
//!                      ┌─────────────┐
//!                      │    Value    │
//!                      └──────┬──────┘
//!                             │ marshal / replay
//!                             ▼
//!                      ┌─────────────┐
//!                      │     AOF     │
//!                      │  (append)   │
//!                      └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use respwire::{Reader, Value};
//!
//! let raw = "*3\r\n$3\r\nset\r\n$6\r\nleader\r\n$7\r\nCharlie\r\n";
//! let mut reader = Reader::new(raw.as_bytes());
//! let (value, len) = reader.read_value().unwrap().unwrap();
//!
//! assert_eq!(len, raw.len());
//! assert_eq!(value.to_string(), "[set leader Charlie]");
//! assert_eq!(value, Value::multi_bulk("set", ["leader", "Charlie"]));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod aof;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RespError, Result};
pub use config::Config;
pub use protocol::{Kind, MultiBulk, Reader, Value, Writer};
pub use aof::{Aof, SyncPolicy};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of respwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
