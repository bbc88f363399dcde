//! respwire Server Binary
//!
//! A small demo server: PING, ECHO, SET, GET, DEL and QUIT over an in-memory
//! map, with mutating commands journaled to an append-only file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use parking_lot::RwLock;
use respwire::aof::AofRecovery;
use respwire::network::{Connection, Server};
use respwire::{Aof, Config, SyncPolicy, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// respwire Server
#[derive(Parser, Debug)]
#[command(name = "respwire-server")]
#[command(about = "RESP demo server with append-only persistence")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Append-only file; omit to run without persistence
    #[arg(short, long)]
    aof: Option<String>,

    /// AOF sync policy: never, always or everysec
    #[arg(long, default_value = "everysec")]
    appendfsync: SyncPolicy,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

type Store = Arc<RwLock<HashMap<Bytes, Bytes>>>;

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,respwire=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("respwire server v{}", respwire::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .sync_policy(args.appendfsync);
    if let Some(path) = &args.aof {
        builder = builder.aof_path(path);
    }
    let config = builder.build();

    let store: Store = Arc::new(RwLock::new(HashMap::new()));

    let aof = match &config.aof_path {
        Some(path) => match open_aof(path, &config, &store) {
            Ok(aof) => Some(Arc::new(aof)),
            Err(e) => {
                tracing::error!("Failed to open AOF {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let mut server = Server::new(config);
    register_commands(&mut server, store, aof);

    if let Err(e) = server.listen_and_serve() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Replay the journal into `store`, then open it for appending
fn open_aof(path: &Path, config: &Config, store: &Store) -> respwire::Result<Aof> {
    if path.exists() {
        let (commands, result) = AofRecovery::recover(path)?;
        let mut map = store.write();
        for command in &commands {
            if let Some(args) = command.as_array() {
                apply(&mut map, args);
            }
        }
        tracing::info!(
            "AOF replay: {} commands, {} bytes{}",
            result.values_recovered,
            result.valid_len,
            if result.was_truncated { " (torn tail truncated)" } else { "" }
        );
    }

    Aof::open_with(path, config.sync_policy, config.flush_interval())
}

/// Apply a mutating command to the map
fn apply(map: &mut HashMap<Bytes, Bytes>, args: &[Value]) -> i64 {
    let name = args.first().map(|a| a.as_str().to_ascii_lowercase());
    match (name.as_deref(), args) {
        (Some("set"), [_, key, value]) => {
            map.insert(bytes_of(key), bytes_of(value));
            1
        }
        (Some("del"), [_, keys @ ..]) => keys
            .iter()
            .filter(|key| map.remove(&bytes_of(key)).is_some())
            .count() as i64,
        _ => 0,
    }
}

fn bytes_of(value: &Value) -> Bytes {
    value.as_bytes().unwrap_or_default()
}

fn register_commands(server: &mut Server, store: Store, aof: Option<Arc<Aof>>) {
    server.handle_func("ping", |conn, args| {
        match args.get(1) {
            Some(msg) => conn.write_value(&Value::bulk(bytes_of(msg)))?,
            None => conn.write_simple_string("PONG")?,
        }
        Ok(true)
    });

    server.handle_func("echo", |conn, args| {
        match args {
            [_, msg] => conn.write_value(&Value::bulk(bytes_of(msg)))?,
            _ => conn.write_error("ERR wrong number of arguments for 'echo' command")?,
        }
        Ok(true)
    });

    server.handle_func("quit", |conn, _| {
        conn.write_simple_string("OK")?;
        Ok(false)
    });

    let get_store = Arc::clone(&store);
    server.handle_func("get", move |conn, args| {
        match args {
            [_, key] => {
                let value = get_store.read().get(&bytes_of(key)).cloned();
                match value {
                    Some(value) => conn.write_value(&Value::bulk(value))?,
                    None => conn.write_null()?,
                }
            }
            _ => conn.write_error("ERR wrong number of arguments for 'get' command")?,
        }
        Ok(true)
    });

    let set_store = Arc::clone(&store);
    let set_aof = aof.clone();
    server.handle_func("set", move |conn, args| {
        if args.len() != 3 {
            conn.write_error("ERR wrong number of arguments for 'set' command")?;
            return Ok(true);
        }
        journaled(conn, &set_store, set_aof.as_deref(), args, |conn, _| {
            conn.write_simple_string("OK")
        })
    });

    server.handle_func("del", move |conn, args| {
        if args.len() < 2 {
            conn.write_error("ERR wrong number of arguments for 'del' command")?;
            return Ok(true);
        }
        journaled(conn, &store, aof.as_deref(), args, |conn, removed| {
            conn.write_integer(removed)
        })
    });
}

/// Log a mutating command, apply it, then reply
///
/// A failed append is reported to the client and leaves the store untouched.
fn journaled<F>(
    conn: &mut Connection,
    store: &Store,
    aof: Option<&Aof>,
    args: &[Value],
    reply: F,
) -> respwire::Result<bool>
where
    F: FnOnce(&mut Connection, i64) -> respwire::Result<()>,
{
    let mut map = store.write();
    if let Some(aof) = aof {
        if let Err(e) = aof.append(&Value::array(args.to_vec())) {
            drop(map);
            tracing::error!("AOF append failed: {}", e);
            conn.write_error(&format!("ERR {}", e))?;
            return Ok(true);
        }
    }
    let result = apply(&mut map, args);
    drop(map);

    reply(conn, result)?;
    Ok(true)
}
