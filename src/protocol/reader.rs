//! Streaming reader
//!
//! Decodes values directly off a byte source that may deliver data in
//! arbitrary fragments, down to one byte per read.
//!
//! ## Buffering
//! Incoming bytes accumulate in a single `BytesMut` arena. A value is parsed
//! with a cursor into the arena; once complete, its bytes are split off and
//! frozen, and every payload inside it becomes a view into that frozen block.
//! Nothing is copied. The arena only retains bytes of the value in progress,
//! so its size is bounded by the largest single value plus one read chunk.
//!
//! ## Nesting
//! Arrays are decoded with an explicit stack of partially filled arrays
//! rather than recursion. The stack is capped at [`MAX_NESTING_DEPTH`]
//! before each push, so hostile input cannot exhaust the call stack of the
//! code that later walks or drops the value.

use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;
use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::error::{RespError, Result};
use super::value::{Data, Value};

/// Largest accepted bulk string payload (512 MiB)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest accepted array element count
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Largest accepted inline command line (64 KiB)
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Deepest accepted array nesting
pub const MAX_NESTING_DEPTH: usize = 512;

/// Minimum bytes requested from the source per read
const READ_CHUNK: usize = 4096;

/// Maximum bytes requested from the source per read
const MAX_READ_CHUNK: usize = 1024 * 1024;

/// Upper bound on up-front element capacity for a declared array
const PREALLOC_LIMIT: usize = 1024;

/// Result of [`Reader::read_multi_bulk`]
#[derive(Debug, Clone)]
pub struct MultiBulk {
    /// The command as an array of bulk strings
    pub value: Value,

    /// Whether the command arrived as an inline text line
    pub inline: bool,

    /// Bytes consumed from the source
    pub len: usize,
}

/// Reads values from a byte source
pub struct Reader<R> {
    inner: R,
    buf: BytesMut,
    /// Cursor into `buf` for the value being decoded
    pos: usize,
    /// Largest read request worth making, tracked from recent read sizes
    read_hint: usize,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            pos: 0,
            read_hint: READ_CHUNK,
        }
    }

    /// Read the next value of any kind
    ///
    /// Returns the value and the number of bytes it occupied, or `None` when
    /// the source ended cleanly between values. Ending inside a value is
    /// [`RespError::UnexpectedEof`].
    pub fn read_value(&mut self) -> Result<Option<(Value, usize)>> {
        if !self.begin()? {
            return Ok(None);
        }
        let node = self.parse(Mode::Array)?;
        Ok(Some(self.finish(node)))
    }

    /// Read the next command
    ///
    /// A leading `*` must frame an array of bulk strings. Anything else is
    /// read as an inline command line: space separated tokens up to LF, where
    /// a double-quoted span may contain spaces.
    pub fn read_multi_bulk(&mut self) -> Result<Option<MultiBulk>> {
        if !self.begin()? {
            return Ok(None);
        }
        let inline = self.buf[0] != b'*';
        let node = if inline {
            self.parse_inline()?
        } else {
            self.parse(Mode::MultiBulk)?
        };
        let (value, len) = self.finish(node);
        Ok(Some(MultiBulk { value, inline, len }))
    }

    /// Iterate over the remaining values
    pub fn values(self) -> Values<R> {
        Values {
            reader: self,
            done: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    // =========================================================================
    // Buffer management
    // =========================================================================

    /// Start a new top-level value. Returns false on a clean end of input.
    fn begin(&mut self) -> Result<bool> {
        self.pos = 0;
        if self.buf.is_empty() {
            return self.fill(READ_CHUNK);
        }
        Ok(true)
    }

    /// Split the consumed bytes off the arena and materialize the value
    fn finish(&mut self, node: Node) -> (Value, usize) {
        let len = self.pos;
        let block = self.buf.split_to(len).freeze();
        self.pos = 0;
        (node.into_value(&block), len)
    }

    /// Read more bytes into the arena. Returns false when the source is exhausted.
    ///
    /// The request grows past [`READ_CHUNK`] only while the source keeps
    /// filling it, so a source that trickles bytes never pays for zeroing
    /// large regions it will not use.
    fn fill(&mut self, want: usize) -> Result<bool> {
        let chunk = want.clamp(READ_CHUNK, self.read_hint);
        let start = self.buf.len();
        self.buf.resize(start + chunk, 0);
        loop {
            match self.inner.read(&mut self.buf[start..]) {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    self.read_hint = n.saturating_mul(2).clamp(READ_CHUNK, MAX_READ_CHUNK);
                    return Ok(n > 0);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
    }

    /// Make sure the arena holds at least `end` bytes
    fn ensure(&mut self, end: usize) -> Result<()> {
        while self.buf.len() < end {
            if !self.fill(end - self.buf.len())? {
                return Err(RespError::UnexpectedEof);
            }
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<u8> {
        self.ensure(self.pos + 1)?;
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Consume up to and including the first CRLF, returning the line without it
    fn read_line(&mut self) -> Result<Range<usize>> {
        let start = self.pos;
        let mut scanned = start;
        loop {
            if let Some(i) = self.buf[scanned..].windows(2).position(|w| w == b"\r\n") {
                let end = scanned + i;
                self.pos = end + 2;
                return Ok(start..end);
            }
            // A CR at the very end may pair with an LF that has not arrived yet
            scanned = self.buf.len().saturating_sub(1).max(start);
            if !self.fill(READ_CHUNK)? {
                return Err(RespError::UnexpectedEof);
            }
        }
    }

    fn read_number(&mut self) -> Result<Option<i64>> {
        let line = self.read_line()?;
        Ok(parse_int(&self.buf[line]))
    }

    // =========================================================================
    // RESP parsing
    // =========================================================================

    fn parse(&mut self, mode: Mode) -> Result<Node> {
        let mut stack: Vec<PendingArray> = Vec::new();
        'value: loop {
            let start = self.pos;
            let prefix = self.next_byte()?;

            if mode == Mode::MultiBulk && !stack.is_empty() && prefix != b'$' {
                return Err(RespError::protocol(format!(
                    "expected '$', got '{}'",
                    char::from(prefix)
                )));
            }

            let data = match prefix {
                b'+' => NodeData::Simple(self.read_line()?),
                b'-' => NodeData::Error(self.read_line()?),
                b':' => match self.read_number()? {
                    Some(n) => NodeData::Integer(n),
                    None => return Err(RespError::protocol("invalid integer")),
                },
                b'$' => NodeData::Bulk(self.read_bulk()?),
                b'*' => match self.read_count(mode)? {
                    None => NodeData::Array(None),
                    Some(0) => NodeData::Array(Some(Vec::new())),
                    Some(count) => {
                        if stack.len() >= MAX_NESTING_DEPTH {
                            return Err(RespError::protocol("max nesting depth exceeded"));
                        }
                        stack.push(PendingArray {
                            start,
                            remaining: count,
                            items: Vec::with_capacity(count.min(PREALLOC_LIMIT)),
                        });
                        continue;
                    }
                },
                _ => return Err(RespError::protocol("unknown first byte")),
            };

            let mut node = Node { data, span: Some(start..self.pos) };

            // Attach the finished node to its parent, closing every array it completes
            while let Some(mut parent) = stack.pop() {
                parent.items.push(node);
                parent.remaining -= 1;
                if parent.remaining > 0 {
                    stack.push(parent);
                    continue 'value;
                }
                node = Node {
                    data: NodeData::Array(Some(parent.items)),
                    span: Some(parent.start..self.pos),
                };
            }
            return Ok(node);
        }
    }

    fn read_bulk(&mut self) -> Result<Option<Range<usize>>> {
        let len = match self.read_number()? {
            Some(n) if n <= MAX_BULK_LEN => n,
            _ => return Err(RespError::protocol("invalid bulk length")),
        };
        if len < 0 {
            return Ok(None);
        }
        let start = self.pos;
        let end = start + len as usize;

        self.ensure(end + 1)?;
        if self.buf[end] != b'\r' {
            return Err(RespError::protocol("invalid bulk line ending"));
        }
        self.ensure(end + 2)?;
        if self.buf[end + 1] != b'\n' {
            return Err(RespError::protocol("invalid bulk line ending"));
        }
        self.pos = end + 2;
        Ok(Some(start..end))
    }

    fn read_count(&mut self, mode: Mode) -> Result<Option<usize>> {
        match self.read_number()? {
            Some(n) if n <= MAX_ARRAY_LEN => Ok(usize::try_from(n).ok()),
            _ => Err(RespError::protocol(match mode {
                Mode::MultiBulk => "invalid multibulk length",
                Mode::Array => "invalid array length",
            })),
        }
    }

    // =========================================================================
    // Inline parsing
    // =========================================================================

    fn parse_inline(&mut self) -> Result<Node> {
        let line_start = self.pos;
        let mut tokens = Vec::new();
        let mut state = Inline::Between;

        loop {
            if self.pos - line_start >= MAX_INLINE_LEN {
                return Err(RespError::protocol("too big inline request"));
            }
            let at = self.pos;
            let b = self.next_byte()?;

            state = match (state, b) {
                (Inline::Between, b'\n') | (Inline::AfterQuote, b'\n') => break,
                // Runs of spaces collapse: `SET  a` is two tokens, not three
                (Inline::Between, b' ') | (Inline::AfterQuote, b' ') => Inline::Between,
                (Inline::Between, b'"') => Inline::Quoted(at + 1),
                (Inline::Between, _) => Inline::Bare(at),

                (Inline::Bare(start), b' ') => {
                    tokens.push(Node::token(start..at));
                    Inline::Between
                }
                (Inline::Bare(start), b'\n') => {
                    let end = if self.buf[at - 1] == b'\r' { at - 1 } else { at };
                    if end > start {
                        tokens.push(Node::token(start..end));
                    }
                    break;
                }
                (Inline::Bare(_), b'"') => return Err(unbalanced_quotes()),
                (Inline::Bare(start), _) => Inline::Bare(start),

                (Inline::Quoted(start), b'"') => {
                    tokens.push(Node::token(start..at));
                    Inline::AfterQuote
                }
                (Inline::Quoted(_), b'\n') => return Err(unbalanced_quotes()),
                (Inline::Quoted(start), _) => Inline::Quoted(start),

                (Inline::AfterQuote, b'\r') => {
                    if self.next_byte()? != b'\n' {
                        return Err(unbalanced_quotes());
                    }
                    break;
                }
                (Inline::AfterQuote, _) => return Err(unbalanced_quotes()),
            };
        }

        Ok(Node {
            data: NodeData::Array(Some(tokens)),
            span: None,
        })
    }
}

/// Iterator over the values of a [`Reader`]
///
/// Ends after the first error: the offending bytes stay buffered, so reading
/// on would only repeat it.
pub struct Values<R> {
    reader: Reader<R>,
    done: bool,
}

impl<R: Read> Iterator for Values<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_value() {
            Ok(Some((value, _))) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for Values<R> {}

fn unbalanced_quotes() -> RespError {
    RespError::protocol("unbalanced quotes in request")
}

/// Parse a strict signed decimal: optional `-`, no `+`, no leading zeros
fn parse_int(text: &[u8]) -> Option<i64> {
    let digits = text.strip_prefix(b"-").unwrap_or(text);
    let well_formed = match digits {
        [] => false,
        [b'0'] => digits.len() == text.len(),
        [b'0', ..] => false,
        _ => digits.iter().all(u8::is_ascii_digit),
    };
    if !well_formed {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

// =============================================================================
// Parse tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Children may be any kind
    Array,
    /// Children must be bulk strings
    MultiBulk,
}

#[derive(Debug, Clone, Copy)]
enum Inline {
    Between,
    Bare(usize),
    Quoted(usize),
    AfterQuote,
}

struct PendingArray {
    start: usize,
    remaining: usize,
    items: Vec<Node>,
}

/// A decoded value expressed as offsets into the arena
struct Node {
    data: NodeData,
    /// Wire bytes of this value; `None` for values synthesized from inline text
    span: Option<Range<usize>>,
}

enum NodeData {
    Simple(Range<usize>),
    Error(Range<usize>),
    Integer(i64),
    Bulk(Option<Range<usize>>),
    Array(Option<Vec<Node>>),
}

impl Node {
    fn token(range: Range<usize>) -> Self {
        Node {
            data: NodeData::Bulk(Some(range)),
            span: None,
        }
    }

    fn into_value(self, block: &Bytes) -> Value {
        let data = match self.data {
            NodeData::Simple(r) => Data::Simple(block.slice(r)),
            NodeData::Error(r) => Data::Error(block.slice(r)),
            NodeData::Integer(n) => Data::Integer(n),
            NodeData::Bulk(r) => Data::Bulk(r.map(|r| block.slice(r))),
            NodeData::Array(items) => Data::Array(
                items.map(|items| items.into_iter().map(|n| n.into_value(block)).collect()),
            ),
        };
        Value::from_parts(data, self.span.map(|r| block.slice(r)))
    }
}
