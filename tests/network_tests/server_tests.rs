//! Tests for the TCP server and connection
//!
//! These tests verify:
//! - Command dispatch over loopback, from many concurrent clients
//! - Inline commands from a raw socket
//! - Unknown commands and protocol errors
//! - Handlers closing the connection, by reply or by error
//! - Connection limit

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use respwire::network::{Connection, Server};
use respwire::protocol::{Kind, Value};
use respwire::{Config, RespError};

// =============================================================================
// Helper Functions
// =============================================================================

/// Start a small key-value server on an ephemeral port
fn start_server(config: Config) -> SocketAddr {
    let kvs: Arc<RwLock<HashMap<String, String>>> = Arc::new(RwLock::new(HashMap::new()));
    let mut server = Server::new(config);

    server.handle_func("ping", |conn, _| {
        conn.write_simple_string("PONG")?;
        Ok(true)
    });

    let set_kvs = Arc::clone(&kvs);
    server.handle_func("SET", move |conn, args| {
        if args.len() != 3 {
            conn.write_error("ERR wrong number of arguments for 'set' command")?;
        } else {
            set_kvs.write().insert(args[1].to_string(), args[2].to_string());
            conn.write_simple_string("OK")?;
        }
        Ok(true)
    });

    server.handle_func("get", move |conn, args| {
        if args.len() != 2 {
            conn.write_error("ERR wrong number of arguments for 'get' command")?;
        } else {
            let value = kvs.read().get(&*args[1].as_str()).cloned();
            match value {
                Some(value) => conn.write_string(&value)?,
                None => conn.write_null()?,
            }
        }
        Ok(true)
    });

    server.handle_func("quit", |conn, _| {
        conn.write_simple_string("OK")?;
        Ok(false)
    });

    server.handle_func("fail", |conn, _| {
        conn.write_simple_string("partial")?;
        Err(RespError::Config("backing store unavailable".to_string()))
    });

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || server.serve(listener));
    addr
}

fn default_server() -> SocketAddr {
    start_server(Config::default())
}

/// Send raw bytes and read whatever comes back until the server closes
fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(request).unwrap();
    let mut response = Vec::new();
    let mut chunk = [0u8; 512];
    // A reset after the final reply still counts as the end of the exchange
    while let Ok(n) = stream.read(&mut chunk) {
        if n == 0 {
            break;
        }
        response.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(response).unwrap()
}

// =============================================================================
// Dispatch Tests
// =============================================================================

#[test]
fn test_ping_set_get_quit() {
    let addr = default_server();
    let mut conn = Connection::connect(addr).unwrap();

    assert_eq!(conn.call("PING", Vec::<&str>::new()).unwrap().as_str(), "PONG");
    assert_eq!(
        conn.call("SET", ["key", "123.4"]).unwrap(),
        Value::simple_string("OK")
    );
    assert_eq!(conn.call("GET", ["key"]).unwrap().as_float(), 123.4);
    assert!(conn.call("GET", ["missing"]).unwrap().is_null());
    assert_eq!(conn.call("QUIT", Vec::<&str>::new()).unwrap().as_str(), "OK");

    assert!(conn.read_value().unwrap().is_none());
}

#[test]
fn test_many_concurrent_clients() {
    let addr = default_server();

    let handles: Vec<_> = (0..25)
        .map(|i| {
            thread::spawn(move || {
                let mut conn = Connection::connect(addr).unwrap();
                let key = format!("key:{}", i);

                assert_eq!(conn.call("ping", Vec::<&str>::new()).unwrap().as_str(), "PONG");
                assert_eq!(conn.call("set", [key.as_str(), "123.4"]).unwrap().as_str(), "OK");
                assert_eq!(conn.call("get", [key.as_str()]).unwrap().as_float(), 123.4);
                assert_eq!(conn.call("quit", Vec::<&str>::new()).unwrap().as_str(), "OK");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_wrong_arity_reply() {
    let addr = default_server();
    let mut conn = Connection::connect(addr).unwrap();

    let reply = conn.call("set", ["only-key"]).unwrap();
    assert_eq!(reply.kind(), Kind::Error);
    assert_eq!(
        reply.as_error().as_deref(),
        Some("ERR wrong number of arguments for 'set' command")
    );
}

#[test]
fn test_inline_commands() {
    let addr = default_server();
    let response = raw_exchange(addr, b"PING\r\nset greeting \"hello world\"\r\nget greeting\r\nquit\r\n");
    assert_eq!(response, "+PONG\r\n+OK\r\n$11\r\nhello world\r\n+OK\r\n");
}

#[test]
fn test_empty_inline_line_is_ignored() {
    let addr = default_server();
    let response = raw_exchange(addr, b"\r\n\r\nQUIT\r\n");
    assert_eq!(response, "+OK\r\n");
}

#[test]
fn test_unknown_command() {
    let addr = default_server();
    let response = raw_exchange(addr, b"*1\r\n$5\r\nFLUSH\r\nquit\r\n");
    assert_eq!(response, "-ERR unknown command 'FLUSH'\r\n+OK\r\n");
}

#[test]
fn test_handler_error_closes_connection() {
    let addr = default_server();
    let response = raw_exchange(addr, b"PING\r\nFAIL\r\nPING\r\n");
    // Nothing after the failing command is answered
    assert!(response.starts_with("+PONG\r\n"), "got {:?}", response);
    assert!(!response.contains("+PONG\r\n+PONG"), "got {:?}", response);

    // The server keeps serving other clients
    let mut conn = Connection::connect(addr).unwrap();
    assert_eq!(conn.call("ping", Vec::<&str>::new()).unwrap().as_str(), "PONG");
}

#[test]
fn test_protocol_error_closes_connection() {
    let addr = default_server();
    let response = raw_exchange(addr, b"*1\r\n:1\r\n");
    assert_eq!(response, "-ERR Protocol error: expected '$', got ':'\r\n");
}

#[test]
fn test_unbalanced_quotes_reply() {
    let addr = default_server();
    let response = raw_exchange(addr, b"set \"a\"b c\r\n");
    assert_eq!(response, "-ERR Protocol error: unbalanced quotes in request\r\n");
}

// =============================================================================
// Connection Limit Tests
// =============================================================================

#[test]
fn test_max_connections_rejects_extra_clients() {
    let addr = start_server(Config::builder().max_connections(1).build());

    let mut first = Connection::connect(addr).unwrap();
    assert_eq!(first.call("ping", Vec::<&str>::new()).unwrap().as_str(), "PONG");

    let mut second = Connection::connect(addr).unwrap();
    let (reply, _) = second.read_value().unwrap().unwrap();
    assert_eq!(reply.as_error().as_deref(), Some("ERR max number of clients reached"));

    // The first client is unaffected
    assert_eq!(first.call("ping", Vec::<&str>::new()).unwrap().as_str(), "PONG");
}
