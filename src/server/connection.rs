//! Client connection
//!
//! One accepted socket. Reading a request means framing one Modbus TCP ADU:
//! the six-byte MBAP prefix first, then however many bytes its length field
//! announces. A peer that goes away mid-frame is a normal close, not an
//! error.

use std::io::ErrorKind;
use std::net::SocketAddr;

use rmodbus::ModbusFrameBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{RegMirrorError, Result};

/// Bytes of the MBAP header before the unit id.
const MBAP_PREFIX: usize = 6;

/// Outcome of one framed read.
pub enum Received {
    /// A complete request of this many bytes sits in the buffer.
    Request(usize),
    /// The peer closed or reset the connection.
    Closed,
}

pub struct ClientConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The underlying stream, for readiness polling.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Read one request ADU into `buf`.
    pub async fn read_request(&mut self, buf: &mut ModbusFrameBuf) -> Result<Received> {
        if let Err(e) = self.stream.read_exact(&mut buf[..MBAP_PREFIX]).await {
            return if is_disconnect(e.kind()) {
                Ok(Received::Closed)
            } else {
                Err(e.into())
            };
        }

        // MBAP length counts everything after itself (unit id + PDU)
        let remainder = usize::from(u16::from_be_bytes([buf[4], buf[5]]));
        if remainder < 2 || MBAP_PREFIX + remainder > buf.len() {
            return Err(RegMirrorError::Frame(format!(
                "invalid MBAP length {remainder} from {}",
                self.peer
            )));
        }

        match self
            .stream
            .read_exact(&mut buf[MBAP_PREFIX..MBAP_PREFIX + remainder])
            .await
        {
            Ok(_) => Ok(Received::Request(MBAP_PREFIX + remainder)),
            Err(e) if is_disconnect(e.kind()) => Ok(Received::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Send a reply frame.
    pub async fn send_reply(&mut self, reply: &[u8]) -> Result<()> {
        self.stream.write_all(reply).await?;
        Ok(())
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
