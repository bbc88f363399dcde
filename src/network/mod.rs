//! Network Module
//!
//! The thin layer around the codec: TCP accept loop and command dispatch.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection
//! - Commands routed by name through a handler table

mod server;
mod connection;

pub use server::{Handler, Server};
pub use connection::Connection;
