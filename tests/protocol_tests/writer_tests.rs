//! Tests for the Writer
//!
//! These tests verify:
//! - Exact bytes produced by each write method
//! - One sink write per value
//! - Writer output decodes back through the Reader

use std::io::{self, Write};

use respwire::protocol::{Reader, Value, Writer};

/// Records the size of every write it receives
#[derive(Default)]
struct RecordingSink {
    data: Vec<u8>,
    writes: Vec<usize>,
    flushes: usize,
}

impl Write for RecordingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        self.writes.push(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[test]
fn test_writer_output() {
    let mut wr = Writer::new(Vec::new());
    let command = Value::multi_bulk("HELLO", [1, 2, 3]);
    wr.write_array(command.as_array().unwrap()).unwrap();
    wr.write_bytes(b"HELLO").unwrap();
    wr.write_string("HELLO").unwrap();
    wr.write_simple_string("HELLO").unwrap();
    wr.write_error("HELLO").unwrap();
    wr.write_integer(1).unwrap();
    wr.write_null().unwrap();
    wr.write_value(&Value::simple_string("HELLO")).unwrap();

    let expected = concat!(
        "*4\r\n$5\r\nHELLO\r\n$1\r\n1\r\n$1\r\n2\r\n$1\r\n3\r\n",
        "$5\r\nHELLO\r\n",
        "$5\r\nHELLO\r\n",
        "+HELLO\r\n",
        "-HELLO\r\n",
        ":1\r\n",
        "$-1\r\n",
        "+HELLO\r\n",
    );
    assert_eq!(String::from_utf8(wr.into_inner()).unwrap(), expected);
}

#[test]
fn test_each_value_is_one_write() {
    let mut wr = Writer::new(RecordingSink::default());
    wr.write_multi_bulk("SET", ["key", "value"]).unwrap();
    wr.write_array(&[Value::integer(1), Value::null_array()]).unwrap();
    wr.write_error("ERR x").unwrap();

    let sink = wr.get_ref();
    assert_eq!(sink.writes.len(), 3);
    assert_eq!(sink.writes.iter().sum::<usize>(), sink.data.len());
}

#[test]
fn test_flush_reaches_sink() {
    let mut wr = Writer::new(RecordingSink::default());
    wr.write_integer(5).unwrap();
    wr.flush().unwrap();
    assert_eq!(wr.get_ref().flushes, 1);
}

#[test]
fn test_error_and_simple_strings_stay_on_one_line() {
    let mut wr = Writer::new(Vec::new());
    wr.write_error("ERR line\r\nbreak").unwrap();
    wr.write_simple_string("a\nb").unwrap();
    assert_eq!(wr.get_ref().as_slice(), b"-ERR line  break\r\n+a b\r\n");
}

#[test]
fn test_writer_output_reads_back() {
    let values = vec![
        Value::simple_string("OK"),
        Value::error("ERR nope"),
        Value::integer(-3),
        Value::string("bulk"),
        Value::null(),
        Value::null_array(),
        Value::array(vec![Value::integer(1), Value::array(vec![])]),
    ];

    let mut wr = Writer::new(Vec::new());
    for value in &values {
        wr.write_value(value).unwrap();
    }
    let encoded = wr.into_inner();

    let decoded: Vec<Value> = Reader::new(encoded.as_slice())
        .values()
        .collect::<respwire::Result<_>>()
        .unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn test_write_error_propagates() {
    struct Full;
    impl Write for Full {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut wr = Writer::new(Full);
    assert!(matches!(wr.write_integer(1), Err(respwire::RespError::Io(_))));
}
