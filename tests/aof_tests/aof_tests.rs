//! Tests for the append-only log
//!
//! These tests verify:
//! - Open/append/close/reopen cycles preserve every value in order
//! - Batched appends land contiguously after earlier values
//! - Closed logs reject every operation with "closed"
//! - Concurrent appends never interleave
//! - Scan ignores a half-written tail

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use respwire::protocol::Value;
use respwire::{Aof, RespError, SyncPolicy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_aof() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let aof_path = temp_dir.path().join("appendonly.aof");
    (temp_dir, aof_path)
}

fn hello(i: usize) -> Value {
    Value::bulk(format!("hello world #{}\n", i))
}

fn scan_all(aof: &Aof) -> Vec<Value> {
    let mut values = Vec::new();
    aof.scan(|v| values.push(v)).unwrap();
    values
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_directory_fails() {
    let temp_dir = TempDir::new().unwrap();
    assert!(Aof::open(temp_dir.path()).is_err());
}

#[test]
fn test_open_creates_file() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();

    assert!(path.exists());
    assert_eq!(aof.path(), path.as_path());
    assert_eq!(aof.policy(), SyncPolicy::Never);
    assert!(scan_all(&aof).is_empty());
}

#[test]
fn test_open_with_policy() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open_with(&path, SyncPolicy::EverySecond, Duration::from_millis(10)).unwrap();
    assert_eq!(aof.policy(), SyncPolicy::EverySecond);
}

// =============================================================================
// Append / Scan Tests
// =============================================================================

#[test]
fn test_append_scan_reopen() {
    let (_temp, path) = setup_temp_aof();
    let n = 2000;

    let aof = Aof::open(&path).unwrap();
    aof.set_sync_policy(SyncPolicy::EverySecond).unwrap();
    for i in 0..n {
        aof.append(&hello(i)).unwrap();
    }
    let values = scan_all(&aof);
    assert_eq!(values.len(), n);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(value.as_str(), format!("hello world #{}\n", i));
    }
    aof.close().unwrap();

    let aof = Aof::open(&path).unwrap();
    for i in n..2 * n {
        aof.append(&hello(i)).unwrap();
    }
    let values = scan_all(&aof);
    assert_eq!(values.len(), 2 * n);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(*value, hello(i));
    }
}

#[test]
fn test_append_multi_follows_earlier_values() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();

    for i in 0..10 {
        aof.append(&hello(i)).unwrap();
    }
    let batch: Vec<Value> = (0..50)
        .map(|i| Value::bulk(format!("hello multi world #{}\n", i)))
        .collect();
    aof.append_multi(&batch).unwrap();

    let values = scan_all(&aof);
    assert_eq!(values.len(), 60);
    assert_eq!(&values[10..], &batch[..]);
}

#[test]
fn test_append_every_kind() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open_with(&path, SyncPolicy::Always, Duration::from_secs(1)).unwrap();

    let values = vec![
        Value::multi_bulk("SET", ["k", "v"]),
        Value::simple_string("OK"),
        Value::error("ERR x"),
        Value::integer(42),
        Value::null(),
        Value::null_array(),
    ];
    for value in &values {
        aof.append(value).unwrap();
    }

    assert_eq!(scan_all(&aof), values);
}

#[test]
fn test_file_holds_plain_wire_encoding() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();
    aof.append(&Value::multi_bulk("DEL", ["k"])).unwrap();
    aof.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n");
}

#[test]
fn test_scan_stops_at_torn_tail() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();
    aof.append(&hello(0)).unwrap();
    aof.append(&hello(1)).unwrap();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"*2\r\n$3\r\nSET").unwrap();

    let mut seen = Vec::new();
    let result = aof.scan(|v| seen.push(v));
    assert!(matches!(result, Err(RespError::UnexpectedEof)));
    assert_eq!(seen, vec![hello(0), hello(1)]);
}

#[test]
fn test_sync_flushes_on_demand() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();
    aof.append(&hello(0)).unwrap();
    aof.sync().unwrap();
    assert_eq!(scan_all(&aof), vec![hello(0)]);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_twice_reports_closed() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path).unwrap();

    assert!(!aof.is_closed());
    aof.close().unwrap();
    assert!(aof.is_closed());

    let err = aof.close().unwrap_err();
    assert!(matches!(err, RespError::Closed));
    assert_eq!(err.to_string(), "closed");
}

#[test]
fn test_operations_after_close_fail() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open_with(&path, SyncPolicy::EverySecond, Duration::from_millis(5)).unwrap();
    aof.close().unwrap();

    assert!(matches!(aof.append(&hello(0)), Err(RespError::Closed)));
    assert!(matches!(aof.append_multi(&[hello(0)]), Err(RespError::Closed)));
    assert!(matches!(aof.scan(|_| {}), Err(RespError::Closed)));
    assert!(matches!(aof.sync(), Err(RespError::Closed)));
    assert!(matches!(
        aof.set_sync_policy(SyncPolicy::Always),
        Err(RespError::Closed)
    ));
}

#[test]
fn test_drop_closes_and_persists() {
    let (_temp, path) = setup_temp_aof();
    {
        let aof = Aof::open_with(&path, SyncPolicy::EverySecond, Duration::from_secs(60)).unwrap();
        aof.append(&hello(7)).unwrap();
    }

    let aof = Aof::open(&path).unwrap();
    assert_eq!(scan_all(&aof), vec![hello(7)]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_appends_do_not_interleave() {
    let (_temp, path) = setup_temp_aof();
    let aof = Arc::new(
        Aof::open_with(&path, SyncPolicy::EverySecond, Duration::from_millis(1)).unwrap(),
    );

    let threads = 8;
    let per_thread = 200;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let aof = Arc::clone(&aof);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let batch = vec![
                        Value::multi_bulk("SET", [format!("t{}", t), i.to_string()]),
                        Value::integer(i as i64),
                    ];
                    aof.append_multi(&batch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let values = scan_all(&aof);
    assert_eq!(values.len(), threads * per_thread * 2);

    // Every batch stays contiguous and each thread's batches keep their order
    let mut next = vec![0i64; threads];
    for pair in values.chunks(2) {
        let args = pair[0].as_array().unwrap();
        let t: usize = args[1].as_str()[1..].parse().unwrap();
        let i = args[2].as_integer();
        assert_eq!(i, next[t]);
        assert_eq!(pair[1].as_integer(), i);
        next[t] += 1;
    }
}

#[test]
fn test_scan_while_appending() {
    let (_temp, path) = setup_temp_aof();
    let aof = Arc::new(Aof::open(&path).unwrap());

    let writer = {
        let aof = Arc::clone(&aof);
        thread::spawn(move || {
            for i in 0..2000 {
                aof.append(&hello(i)).unwrap();
            }
        })
    };

    for _ in 0..20 {
        let values = scan_all(&aof);
        for (i, value) in values.iter().enumerate() {
            assert_eq!(*value, hello(i));
        }
    }
    writer.join().unwrap();
    assert_eq!(scan_all(&aof).len(), 2000);
}
