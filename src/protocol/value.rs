//! Value definitions
//!
//! The five RESP value shapes, their typed accessors and canonical marshaling.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Canonical encoding of a null BulkString
pub const NULL_BULK: &[u8] = b"$-1\r\n";

/// Canonical encoding of a null Array
pub const NULL_ARRAY: &[u8] = b"*-1\r\n";

const CRLF: &[u8] = b"\r\n";

/// Wire type of a value, identified by its leading byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    SimpleString = b'+',
    Error = b'-',
    Integer = b':',
    BulkString = b'$',
    Array = b'*',
}

impl Kind {
    /// Map a leading byte to its kind
    pub fn from_prefix(byte: u8) -> Option<Kind> {
        match byte {
            b'+' => Some(Kind::SimpleString),
            b'-' => Some(Kind::Error),
            b':' => Some(Kind::Integer),
            b'$' => Some(Kind::BulkString),
            b'*' => Some(Kind::Array),
            _ => None,
        }
    }

    /// The leading byte for this kind
    pub fn prefix(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::SimpleString => "SimpleString",
            Kind::Error => "Error",
            Kind::Integer => "Integer",
            Kind::BulkString => "BulkString",
            Kind::Array => "Array",
        };
        f.write_str(name)
    }
}

/// Variant payload of a value
#[derive(Clone)]
pub(crate) enum Data {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Value>>),
}

/// A single RESP value
///
/// Values are immutable once built. A value produced by [`Reader`](super::Reader)
/// keeps a view of the exact bytes it was decoded from, so marshaling it again
/// returns those bytes without re-encoding.
///
/// Equality compares canonical encodings: two values are equal when they
/// marshal to the same bytes.
#[derive(Clone)]
pub struct Value {
    data: Data,
    raw: Option<Bytes>,
}

// =============================================================================
// Construction
// =============================================================================

impl Value {
    pub(crate) fn from_parts(data: Data, raw: Option<Bytes>) -> Self {
        Self { data, raw }
    }

    fn new(data: Data) -> Self {
        Self { data, raw: None }
    }

    /// A simple string. CR and LF characters are replaced with spaces.
    pub fn simple_string(s: &str) -> Self {
        Self::new(Data::Simple(single_line(s)))
    }

    /// An error. CR and LF characters are replaced with spaces.
    pub fn error(msg: &str) -> Self {
        Self::new(Data::Error(single_line(msg)))
    }

    /// A bulk string holding arbitrary bytes
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::new(Data::Bulk(Some(data.into())))
    }

    /// A bulk string holding a copy of `s`
    pub fn string(s: &str) -> Self {
        Self::new(Data::Bulk(Some(Bytes::copy_from_slice(s.as_bytes()))))
    }

    /// The null bulk string
    pub fn null() -> Self {
        Self::new(Data::Bulk(None))
    }

    pub fn integer(n: i64) -> Self {
        Self::new(Data::Integer(n))
    }

    /// An integer reply of 1 or 0
    pub fn boolean(b: bool) -> Self {
        Self::integer(if b { 1 } else { 0 })
    }

    /// A bulk string holding the shortest decimal text of `f`
    pub fn float(f: f64) -> Self {
        Self::bulk(f.to_string())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(Data::Array(Some(items)))
    }

    /// The null array
    pub fn null_array() -> Self {
        Self::new(Data::Array(None))
    }

    /// A command: the name followed by each argument, all as bulk strings
    ///
    /// ```
    /// use respwire::Value;
    ///
    /// let cmd = Value::multi_bulk("SET", ["leader", "Charlie"]);
    /// assert_eq!(&cmd.marshal()[..], b"*3\r\n$3\r\nSET\r\n$6\r\nleader\r\n$7\r\nCharlie\r\n");
    /// ```
    pub fn multi_bulk<I>(name: &str, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: BulkArg,
    {
        let args = args.into_iter();
        let mut items = Vec::with_capacity(1 + args.size_hint().0);
        items.push(Value::string(name));
        items.extend(args.map(BulkArg::into_bulk));
        Self::array(items)
    }
}

fn single_line(s: &str) -> Bytes {
    if !s.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Bytes::copy_from_slice(s.as_bytes());
    }
    let cleaned: Vec<u8> = s
        .bytes()
        .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b })
        .collect();
    Bytes::from(cleaned)
}

// =============================================================================
// Accessors
// =============================================================================

impl Value {
    pub fn kind(&self) -> Kind {
        match self.data {
            Data::Simple(_) => Kind::SimpleString,
            Data::Error(_) => Kind::Error,
            Data::Integer(_) => Kind::Integer,
            Data::Bulk(_) => Kind::BulkString,
            Data::Array(_) => Kind::Array,
        }
    }

    /// True for the null bulk string and the null array
    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Bulk(None) | Data::Array(None))
    }

    /// Text form of the value
    ///
    /// Byte payloads are decoded lossily, integers print in decimal, arrays
    /// print as `[a b c]` and nulls print as the empty string.
    pub fn as_str(&self) -> Cow<'_, str> {
        match &self.data {
            Data::Simple(b) | Data::Error(b) | Data::Bulk(Some(b)) => String::from_utf8_lossy(b),
            Data::Integer(n) => Cow::Owned(n.to_string()),
            Data::Bulk(None) | Data::Array(None) => Cow::Borrowed(""),
            Data::Array(Some(items)) => {
                let parts: Vec<Cow<'_, str>> = items.iter().map(Value::as_str).collect();
                Cow::Owned(format!("[{}]", parts.join(" ")))
            }
        }
    }

    /// Integer form of the value
    ///
    /// Non-integers are parsed as base-10 text, then as floating point
    /// (truncated), and fall back to zero.
    pub fn as_integer(&self) -> i64 {
        if let Data::Integer(n) = self.data {
            return n;
        }
        let text = self.as_str();
        if let Ok(n) = text.parse::<i64>() {
            return n;
        }
        text.parse::<f64>().map(|f| f as i64).unwrap_or(0)
    }

    /// Floating point form of the value, zero when unparsable
    pub fn as_float(&self) -> f64 {
        if let Data::Integer(n) = self.data {
            return n as f64;
        }
        self.as_str().parse::<f64>().unwrap_or(0.0)
    }

    /// True iff the integer form is nonzero
    pub fn as_bool(&self) -> bool {
        self.as_integer() != 0
    }

    /// Raw content of the value
    ///
    /// `None` for nulls, which keeps them distinct from an empty payload.
    /// Integers and arrays yield their text form.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match &self.data {
            Data::Simple(b) | Data::Error(b) | Data::Bulk(Some(b)) => Some(b.clone()),
            Data::Bulk(None) | Data::Array(None) => None,
            Data::Integer(_) | Data::Array(Some(_)) => {
                Some(Bytes::from(self.as_str().into_owned()))
            }
        }
    }

    /// Elements of a non-null array
    pub fn as_array(&self) -> Option<&[Value]> {
        match &self.data {
            Data::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Elements of a non-null array, by value
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self.data {
            Data::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Message of an error value, `None` for every other kind
    pub fn as_error(&self) -> Option<Cow<'_, str>> {
        match &self.data {
            Data::Error(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }
}

// =============================================================================
// Marshaling
// =============================================================================

impl Value {
    /// Wire bytes for this value
    ///
    /// Decoded values return a view of the bytes they were read from.
    pub fn marshal(&self) -> Bytes {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.marshal_into(&mut buf);
        buf.freeze()
    }

    /// Append the wire bytes for this value to `buf`
    pub fn marshal_into(&self, buf: &mut BytesMut) {
        if let Some(raw) = &self.raw {
            buf.extend_from_slice(raw);
            return;
        }
        match &self.data {
            Data::Simple(b) => put_line(buf, b'+', b),
            Data::Error(b) => put_line(buf, b'-', b),
            Data::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Data::Bulk(None) => buf.put_slice(NULL_BULK),
            Data::Bulk(Some(b)) => {
                put_line(buf, b'$', b.len().to_string().as_bytes());
                buf.put_slice(b);
                buf.put_slice(CRLF);
            }
            Data::Array(None) => buf.put_slice(NULL_ARRAY),
            Data::Array(Some(items)) => marshal_array_into(items, buf),
        }
    }

    /// Exact size of [`marshal`](Self::marshal)'s output
    pub fn encoded_len(&self) -> usize {
        if let Some(raw) = &self.raw {
            return raw.len();
        }
        match &self.data {
            Data::Simple(b) | Data::Error(b) => 1 + b.len() + 2,
            Data::Integer(n) => 1 + decimal_len(*n) + 2,
            Data::Bulk(None) => NULL_BULK.len(),
            Data::Bulk(Some(b)) => 1 + decimal_len(b.len() as i64) + 2 + b.len() + 2,
            Data::Array(None) => NULL_ARRAY.len(),
            Data::Array(Some(items)) => array_encoded_len(items),
        }
    }
}

/// Encode `items` as a non-null array without building an owning [`Value`]
pub(crate) fn marshal_array_into(items: &[Value], buf: &mut BytesMut) {
    put_line(buf, b'*', items.len().to_string().as_bytes());
    for item in items {
        item.marshal_into(buf);
    }
}

pub(crate) fn array_encoded_len(items: &[Value]) -> usize {
    1 + decimal_len(items.len() as i64) + 2 + items.iter().map(Value::encoded_len).sum::<usize>()
}

fn put_line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(prefix);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

fn decimal_len(n: i64) -> usize {
    let sign = usize::from(n < 0);
    let mut magnitude = n.unsigned_abs();
    let mut digits = 1;
    while magnitude >= 10 {
        magnitude /= 10;
        digits += 1;
    }
    sign + digits
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.marshal() == other.marshal()
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Data::Simple(b) => f.debug_tuple("SimpleString").field(b).finish(),
            Data::Error(b) => f.debug_tuple("Error").field(b).finish(),
            Data::Integer(n) => f.debug_tuple("Integer").field(n).finish(),
            Data::Bulk(b) => f.debug_tuple("BulkString").field(b).finish(),
            Data::Array(items) => f.debug_tuple("Array").field(items).finish(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::bulk(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::bulk(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::bulk(b)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::bulk(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::float(f64::from(f))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_else(Value::null)
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::integer(i64::from(n))
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, u8, u16, u32);

// =============================================================================
// Command Arguments
// =============================================================================

/// Conversion of a command argument into a bulk string
///
/// Unlike `Into<Value>`, numbers become their decimal text rather than
/// integer values, which is how commands carry them on the wire.
pub trait BulkArg {
    fn into_bulk(self) -> Value;
}

impl BulkArg for Value {
    fn into_bulk(self) -> Value {
        self
    }
}

impl BulkArg for &str {
    fn into_bulk(self) -> Value {
        Value::string(self)
    }
}

impl BulkArg for String {
    fn into_bulk(self) -> Value {
        Value::bulk(self)
    }
}

impl BulkArg for &String {
    fn into_bulk(self) -> Value {
        Value::string(self)
    }
}

impl BulkArg for &[u8] {
    fn into_bulk(self) -> Value {
        Value::bulk(Bytes::copy_from_slice(self))
    }
}

impl BulkArg for Vec<u8> {
    fn into_bulk(self) -> Value {
        Value::bulk(self)
    }
}

impl BulkArg for Bytes {
    fn into_bulk(self) -> Value {
        Value::bulk(self)
    }
}

impl BulkArg for f64 {
    fn into_bulk(self) -> Value {
        Value::float(self)
    }
}

impl<T: BulkArg> BulkArg for Option<T> {
    fn into_bulk(self) -> Value {
        self.map(BulkArg::into_bulk).unwrap_or_else(Value::null)
    }
}

macro_rules! integer_arg {
    ($($t:ty),*) => {
        $(
            impl BulkArg for $t {
                fn into_bulk(self) -> Value {
                    Value::bulk(self.to_string())
                }
            }
        )*
    };
}

integer_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
