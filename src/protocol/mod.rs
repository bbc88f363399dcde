//! Protocol Module
//!
//! The RESP wire format: value model, streaming reader and writer.
//!
//! ## Wire Format
//! ```text
//! ┌──────┬───────────────┬──────────────────────────────────────────────┐
//! │ Byte │ Kind          │ Body                                         │
//! ├──────┼───────────────┼──────────────────────────────────────────────┤
//! │  +   │ SimpleString  │ text CRLF                                    │
//! │  -   │ Error         │ text CRLF                                    │
//! │  :   │ Integer       │ decimal CRLF                                 │
//! │  $   │ BulkString    │ length CRLF bytes CRLF      ($-1 = null)     │
//! │  *   │ Array         │ count CRLF value...         (*-1 = null)     │
//! │ else │ Inline        │ space separated tokens LF   (commands only)  │
//! └──────┴───────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The same bytes travel over the network and into the append-only log.

mod value;
mod reader;
mod writer;

pub use value::{BulkArg, Kind, Value, NULL_ARRAY, NULL_BULK};
pub use reader::{
    MultiBulk, Reader, Values, MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_INLINE_LEN, MAX_NESTING_DEPTH,
};
pub use writer::Writer;
