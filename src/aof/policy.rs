//! Sync policy
//!
//! Controls when the append-only log forces written bytes to stable storage.

use std::fmt;
use std::str::FromStr;

use crate::error::RespError;

/// Durability mode of an [`Aof`](super::Aof)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Unrecognized policy value; selecting it changes nothing
    Unknown,

    /// No explicit flush; the OS writes back on its own schedule (fastest)
    #[default]
    Never,

    /// Flush before every append returns (safest, slowest)
    Always,

    /// Flush from a background thread once per interval
    EverySecond,
}

impl From<u8> for SyncPolicy {
    fn from(code: u8) -> Self {
        match code {
            0 => SyncPolicy::Never,
            1 => SyncPolicy::Always,
            2 => SyncPolicy::EverySecond,
            _ => SyncPolicy::Unknown,
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPolicy::Unknown => "unknown",
            SyncPolicy::Never => "never",
            SyncPolicy::Always => "always",
            SyncPolicy::EverySecond => "every second",
        };
        f.write_str(label)
    }
}

impl FromStr for SyncPolicy {
    type Err = RespError;

    /// Accepts the display labels plus the `appendfsync` spellings `no` and `everysec`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "no" => Ok(SyncPolicy::Never),
            "always" => Ok(SyncPolicy::Always),
            "every second" | "everysecond" | "everysec" => Ok(SyncPolicy::EverySecond),
            other => Err(RespError::Config(format!("unknown sync policy '{}'", other))),
        }
    }
}
