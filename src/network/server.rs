//! TCP Server
//!
//! Accepts connections and dispatches commands to registered handlers.

use std::collections::HashMap;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::Value;
use super::Connection;

/// A command handler
///
/// Receives the connection and the full command, name first. Returning
/// `Ok(false)` closes the connection after the reply is flushed; an error
/// closes it at once.
pub type Handler = Arc<dyn Fn(&mut Connection, &[Value]) -> Result<bool> + Send + Sync>;

pub(crate) type Handlers = HashMap<String, Handler>;

/// TCP server with a command table
pub struct Server {
    config: Config,
    handlers: Handlers,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for the command `name` (case-insensitive)
    pub fn handle_func<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Connection, &[Value]) -> Result<bool> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_ascii_lowercase(), Arc::new(handler));
    }

    /// Bind `config.listen_addr` and serve forever
    pub fn listen_and_serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)?;
        self.serve(listener)
    }

    /// Serve connections from `listener`, one thread per connection
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Listening on {}", listener.local_addr()?);

        let handlers = Arc::new(self.handlers);
        let active = Arc::new(AtomicUsize::new(0));

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            if active.load(Ordering::Acquire) >= self.config.max_connections {
                reject(stream);
                continue;
            }

            let slot = ConnectionSlot::claim(&active);
            let handlers = Arc::clone(&handlers);
            let read_timeout = self.config.read_timeout();
            let write_timeout = self.config.write_timeout();

            thread::Builder::new()
                .name("resp-conn".to_string())
                .spawn(move || {
                    let _slot = slot;
                    let mut conn = match Connection::new(stream) {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Failed to set up connection: {}", e);
                            return;
                        }
                    };
                    if let Err(e) = conn.set_timeouts(read_timeout, write_timeout) {
                        tracing::warn!("Failed to set timeouts for {}: {}", conn.peer_addr(), e);
                        return;
                    }
                    if let Err(e) = conn.handle(&handlers) {
                        tracing::debug!("Connection {} closed with error: {}", conn.peer_addr(), e);
                    }
                })?;
        }

        Ok(())
    }
}

fn reject(mut stream: TcpStream) {
    tracing::warn!("Rejecting connection: max number of clients reached");
    let _ = stream.write_all(&Value::error("ERR max number of clients reached").marshal());
}

/// Counts a live connection until dropped
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn claim(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
