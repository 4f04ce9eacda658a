//! TCP server
//!
//! Connection acceptance and the single-threaded readiness loop that serves
//! every client against the shared register store.

mod connection;
mod multiplexer;

pub use connection::{ClientConnection, Received};
pub use multiplexer::{ConnectionMultiplexer, Counters};
