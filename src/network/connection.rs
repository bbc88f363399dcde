//! Connection Handler
//!
//! One client connection: a RESP reader and writer over a TCP stream.

use std::io::{BufWriter, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{RespError, Result};
use crate::protocol::{BulkArg, MultiBulk, Reader, Value, Writer};
use super::server::Handlers;

/// A client connection, usable from either end
pub struct Connection {
    /// TCP stream reader (buffered by the RESP reader's arena)
    reader: Reader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: Writer<BufWriter<TcpStream>>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted or connected stream
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: Reader::new(read_stream),
            writer: Writer::new(BufWriter::new(stream)),
            peer_addr,
        })
    }

    /// Connect to a server
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::new(TcpStream::connect(addr)?)
    }

    /// Configure connection timeouts; `None` blocks indefinitely
    pub fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(read)?;
        self.writer.get_ref().get_ref().set_write_timeout(write)?;
        Ok(())
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    // =========================================================================
    // Reading
    // =========================================================================

    pub fn read_value(&mut self) -> Result<Option<(Value, usize)>> {
        self.reader.read_value()
    }

    pub fn read_multi_bulk(&mut self) -> Result<Option<MultiBulk>> {
        self.reader.read_multi_bulk()
    }

    // =========================================================================
    // Writing (buffered until `flush`)
    // =========================================================================

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.writer.write_value(value)
    }

    pub fn write_simple_string(&mut self, s: &str) -> Result<()> {
        self.writer.write_simple_string(s)
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.writer.write_string(s)
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.writer.write_bytes(b)
    }

    pub fn write_integer(&mut self, n: i64) -> Result<()> {
        self.writer.write_integer(n)
    }

    pub fn write_error(&mut self, msg: &str) -> Result<()> {
        self.writer.write_error(msg)
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.writer.write_null()
    }

    pub fn write_array(&mut self, items: &[Value]) -> Result<()> {
        self.writer.write_array(items)
    }

    pub fn write_multi_bulk<I>(&mut self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: BulkArg,
    {
        self.writer.write_multi_bulk(name, args)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// Send a command and wait for its reply
    pub fn call<I>(&mut self, name: &str, args: I) -> Result<Value>
    where
        I: IntoIterator,
        I::Item: BulkArg,
    {
        self.write_multi_bulk(name, args)?;
        self.flush()?;
        match self.read_value()? {
            Some((value, _)) => Ok(value),
            None => Err(RespError::UnexpectedEof),
        }
    }

    // =========================================================================
    // Server side
    // =========================================================================

    /// Serve commands until the client leaves or a handler closes the connection
    pub(crate) fn handle(&mut self, handlers: &Handlers) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match self.reader.read_multi_bulk() {
                Ok(Some(command)) => command,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(RespError::UnexpectedEof) => {
                    tracing::debug!("Client {} disconnected mid-command", self.peer_addr);
                    return Ok(());
                }
                Err(RespError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection to {} ended: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(e @ RespError::Protocol(_)) => {
                    tracing::warn!("Protocol error from {}: {}", self.peer_addr, e);
                    // Best effort: the stream is desynchronized either way
                    let _ = self.write_error(&format!("ERR {}", e));
                    let _ = self.flush();
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let args = match command.value.as_array() {
                Some(args) if !args.is_empty() => args,
                _ => continue,
            };
            let name = args[0].as_str().to_ascii_lowercase();

            tracing::trace!(
                "Received {} from {} ({} args, inline={})",
                name,
                self.peer_addr,
                args.len() - 1,
                command.inline
            );

            let keep_open = match handlers.get(&name) {
                Some(handler) => match handler(self, args) {
                    Ok(keep_open) => keep_open,
                    Err(RespError::Io(ref e)) if is_disconnect(e.kind()) => {
                        tracing::debug!("Client {} went away during {}: {}", self.peer_addr, name, e);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!("Handler for {} failed on {}: {}", name, self.peer_addr, e);
                        return Err(e);
                    }
                },
                None => {
                    self.write_error(&format!("ERR unknown command '{}'", args[0]))?;
                    true
                }
            };

            if let Err(e) = self.flush() {
                if let RespError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before reply could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }

            if !keep_open {
                tracing::debug!("Closing connection to {}", self.peer_addr);
                return Ok(());
            }
        }
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            // Read timeouts (WouldBlock on Unix, TimedOut on Windows)
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
