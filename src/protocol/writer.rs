//! Value writer
//!
//! Encodes values onto an output sink. Every write method marshals one value
//! and hands the bytes to the sink in a single `write_all`. Nothing is
//! buffered here; wrap the sink in a `BufWriter` and call [`Writer::flush`]
//! when batching replies.

use std::io::Write;

use bytes::BytesMut;

use crate::error::Result;
use super::value::{array_encoded_len, marshal_array_into, BulkArg, Value};

/// Writes values to a byte sink
pub struct Writer<W> {
    inner: W,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write any value
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.inner.write_all(&value.marshal())?;
        Ok(())
    }

    /// Write a simple string; CR and LF become spaces
    pub fn write_simple_string(&mut self, s: &str) -> Result<()> {
        self.write_value(&Value::simple_string(s))
    }

    /// Write a bulk string from raw bytes
    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.write_value(&Value::from(b))
    }

    /// Write a bulk string from text
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_value(&Value::string(s))
    }

    /// Write the null bulk string
    pub fn write_null(&mut self) -> Result<()> {
        self.write_value(&Value::null())
    }

    pub fn write_error(&mut self, msg: &str) -> Result<()> {
        self.write_value(&Value::error(msg))
    }

    pub fn write_integer(&mut self, n: i64) -> Result<()> {
        self.write_value(&Value::integer(n))
    }

    /// Write a non-null array of `items`
    pub fn write_array(&mut self, items: &[Value]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(array_encoded_len(items));
        marshal_array_into(items, &mut buf);
        self.inner.write_all(&buf)?;
        Ok(())
    }

    /// Write a command: `name` followed by `args`, all as bulk strings
    pub fn write_multi_bulk<I>(&mut self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: BulkArg,
    {
        self.write_value(&Value::multi_bulk(name, args))
    }

    /// Flush the underlying sink
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
