//! Connection multiplexer
//!
//! One task owns the listening socket, every accepted connection, the
//! register store and the counters. The loop blocks on a single readiness
//! wait - accept, any readable client, the report clock or shutdown - and
//! services exactly one event per wakeup. Requests therefore never interleave
//! against the map, which is why the map needs no lock, and persistence for
//! a write completes before the next socket is looked at.
//!
//! ## Socket lifecycle
//!
//! ```text
//! Listening (server socket) --accept--> Active --recv error/shutdown--> Closed
//! ```
//!
//! Closed sockets leave the wait set and drop; nothing else is affected.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use rmodbus::server::ModbusFrame;
use rmodbus::{ModbusFrameBuf, ModbusProto};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::reflect;
use crate::store::{PersistentTable, RegisterStore};

use super::connection::{ClientConnection, Received};

/// Function code position in a TCP ADU; used to decide whether a successful
/// reply warrants write reflection and whether a reply is an exception.
const FUNC_OFFSET: usize = 7;

/// Operational counters.
///
/// Owned per multiplexer instance and shared by reference with whoever wants
/// to observe them, so independent engines (tests run several) never step on
/// each other. Monotonic, reset only when the process restarts.
#[derive(Debug, Default)]
pub struct Counters {
    connections: AtomicU64,
    responses: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// What the readiness wait woke up for.
enum Wakeup {
    Shutdown,
    Report,
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Readable(usize),
}

pub struct ConnectionMultiplexer<T: PersistentTable> {
    listener: TcpListener,
    connections: Vec<Option<ClientConnection>>,
    store: RegisterStore<T>,
    counters: Arc<Counters>,
    unit_id: u8,
    report_interval: Duration,
    shutdown: watch::Receiver<bool>,
    /// Readiness scan starts one past the last serviced slot so a busy
    /// connection cannot starve the ones behind it.
    scan_cursor: usize,
}

impl<T: PersistentTable> ConnectionMultiplexer<T> {
    pub fn new(
        listener: TcpListener,
        store: RegisterStore<T>,
        counters: Arc<Counters>,
        unit_id: u8,
        max_connections: usize,
        report_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            connections: (0..max_connections).map(|_| None).collect(),
            store,
            counters,
            unit_id,
            report_interval,
            shutdown,
            scan_cursor: 0,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Drive the loop until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        let mut report = time::interval(self.report_interval);

        loop {
            let wakeup = {
                let listener = &self.listener;
                let connections = &self.connections;
                let shutdown = &mut self.shutdown;
                let scan_cursor = self.scan_cursor;
                tokio::select! {
                    _ = shutdown.changed() => Wakeup::Shutdown,
                    _ = report.tick() => Wakeup::Report,
                    accepted = listener.accept() => Wakeup::Accepted(accepted),
                    index = next_readable(connections, scan_cursor) => Wakeup::Readable(index),
                }
            };

            match wakeup {
                Wakeup::Shutdown => break,
                Wakeup::Report => self.report(),
                Wakeup::Accepted(accepted) => self.register(accepted),
                Wakeup::Readable(index) => {
                    self.scan_cursor = (index + 1) % self.connections.len();
                    self.service(index).await;
                }
            }
        }

        self.drain();
        Ok(())
    }

    /// Put a freshly accepted socket into the wait set.
    fn register(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                return;
            }
        };

        let Some(slot) = self.connections.iter().position(Option::is_none) else {
            warn!("connection table full, refusing {peer}");
            return;
        };

        match ClientConnection::new(stream, peer) {
            Ok(connection) => {
                self.connections[slot] = Some(connection);
                self.counters.record_connection();
                debug!("client connected from {peer}");
            }
            Err(e) => warn!("cannot register {peer}: {e}"),
        }
    }

    /// Serve one request from a readable connection.
    async fn service(&mut self, index: usize) {
        let mut buf: ModbusFrameBuf = [0; 256];

        let received = match self.connections[index].as_mut() {
            Some(connection) => connection.read_request(&mut buf).await,
            None => return,
        };

        let request_len = match received {
            Ok(Received::Request(len)) => len,
            Ok(Received::Closed) => {
                self.close(index);
                return;
            }
            Err(e) => {
                // hard receive failure: the socket leaves the wait set, the
                // other connections and the map are unaffected
                warn!("receive failed: {e}");
                self.close(index);
                return;
            }
        };

        // decode + apply + encode through the protocol library; the map is
        // handed over via its context implementation
        let mut response: Vec<u8> = Vec::with_capacity(buf.len());
        {
            let mut frame = ModbusFrame::new(self.unit_id, &buf, ModbusProto::TcpUdp, &mut response);
            if let Err(e) = frame.parse() {
                // framing-level garbage, same treatment as a receive failure
                warn!("unparseable frame: {e:?}");
                self.close(index);
                return;
            }

            if frame.processing_required {
                let processed = if frame.readonly {
                    frame.process_read(self.store.map())
                } else {
                    frame.process_write(self.store.map_mut())
                };
                if let Err(e) = processed {
                    warn!("frame processing failed: {e:?}");
                    self.counters.record_error();
                    return;
                }
            }

            if frame.response_required {
                if let Err(e) = frame.finalize_response() {
                    warn!("cannot finalize reply: {e:?}");
                    self.counters.record_error();
                    return;
                }
            }
        }

        if !response.is_empty() {
            let sent = match self.connections[index].as_mut() {
                Some(connection) => connection.send_reply(&response).await,
                None => return,
            };
            if let Err(e) = sent {
                debug!("reply send failed: {e}");
                self.close(index);
                return;
            }

            // an exception reply carries the function code with its high bit
            // set; it counts as an error, but the connection stays open
            if is_exception(&response) {
                self.counters.record_error();
                return;
            }
            self.counters.record_response();
        }

        // the reply only says the write succeeded; recover the mutated cells
        // from the request itself and mirror them
        let func = buf[FUNC_OFFSET];
        if reflect::is_write_request(func) {
            if let Err(e) = reflect::reflect_write(&buf[..request_len], &mut self.store) {
                warn!("write reflection failed: {e}");
            }
        }
    }

    fn close(&mut self, index: usize) {
        if let Some(connection) = self.connections[index].take() {
            debug!("connection from {} closed", connection.peer());
        }
    }

    /// Emit the counter line. Runs on the report clock, never off the back of
    /// request traffic.
    fn report(&self) {
        info!(
            "Connections: {}; Responses: {}; Errors: {}",
            self.counters.connections(),
            self.counters.responses(),
            self.counters.errors()
        );
    }

    /// Release every socket and report one final time.
    fn drain(&mut self) {
        for slot in &mut self.connections {
            slot.take();
        }
        self.report();
        info!("multiplexer stopped");
    }
}

fn is_exception(response: &[u8]) -> bool {
    response
        .get(FUNC_OFFSET)
        .is_some_and(|func| func & 0x80 != 0)
}

/// Wait until any active connection is readable, yielding its slot index.
///
/// This is the wait set: every registered socket gets polled for read
/// readiness, starting at `from` and wrapping, and the loop wakes for the
/// first one that has data (or a pending error, which the subsequent read
/// surfaces).
async fn next_readable(connections: &[Option<ClientConnection>], from: usize) -> usize {
    poll_fn(|cx| {
        let len = connections.len();
        for offset in 0..len {
            let index = (from + offset) % len;
            if let Some(connection) = &connections[index] {
                if connection.stream().poll_read_ready(cx).is_ready() {
                    return Poll::Ready(index);
                }
            }
        }
        Poll::Pending
    })
    .await
}
