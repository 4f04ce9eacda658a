//! Server Tests
//!
//! End-to-end over live TCP: an engine on an ephemeral port, raw Modbus TCP
//! frames from test clients, counters and mirrored rows checked afterwards.

use std::sync::Arc;
use std::time::Duration;

use regmirror::server::Counters;
use regmirror::{Config, Engine, EngineHandle};

use rusqlite::Connection;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct TestServer {
    handle: EngineHandle,
    counters: Arc<Counters>,
    addr: std::net::SocketAddr,
    task: JoinHandle<regmirror::Result<()>>,
    dir: TempDir,
}

async fn start_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .db_path(dir.path().join("registers.db"))
        .max_connections(8)
        .coils(0, 16)
        .discrete_inputs(0, 16)
        .input_registers(0, 16)
        .holding_registers(100, 16)
        .report_interval(Duration::from_secs(3600))
        .build();

    let engine = Engine::open(config).await.unwrap();
    let addr = engine.local_addr().unwrap();
    let handle = engine.handle();
    let counters = engine.counters();
    let task = tokio::spawn(engine.run());

    TestServer {
        handle,
        counters,
        addr,
        task,
        dir,
    }
}

async fn stop_server(server: TestServer) {
    server.handle.stop();
    timeout(Duration::from_secs(5), server.task)
        .await
        .expect("engine did not stop")
        .expect("engine task panicked")
        .expect("engine returned an error");
}

/// Frame a PDU as one Modbus TCP request for unit 1.
fn request(pdu: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x00, 0x07, 0x00, 0x00];
    frame.extend_from_slice(&((pdu.len() as u16 + 1).to_be_bytes()));
    frame.push(1);
    frame.extend_from_slice(pdu);
    frame
}

fn read_holdings_pdu(address: u16, count: u16) -> Vec<u8> {
    let mut pdu = vec![3];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&count.to_be_bytes());
    pdu
}

fn write_registers_pdu(address: u16, values: &[u16]) -> Vec<u8> {
    let mut pdu = vec![16];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
    pdu.push((values.len() * 2) as u8);
    for value in values {
        pdu.extend_from_slice(&value.to_be_bytes());
    }
    pdu
}

/// Send one request and read back the complete reply frame.
async fn transact(stream: &mut TcpStream, frame: &[u8]) -> Vec<u8> {
    stream.write_all(frame).await.unwrap();

    let mut head = [0u8; 6];
    stream.read_exact(&mut head).await.unwrap();
    let remainder = usize::from(u16::from_be_bytes([head[4], head[5]]));

    let mut rest = vec![0u8; remainder];
    stream.read_exact(&mut rest).await.unwrap();

    let mut reply = head.to_vec();
    reply.extend(rest);
    reply
}

fn is_exception(reply: &[u8]) -> bool {
    reply[7] & 0x80 != 0
}

// =============================================================================
// Write visibility and mirroring
// =============================================================================

#[tokio::test]
async fn test_write_visible_to_other_connections_and_mirrored() {
    let server = start_server().await;

    let mut writer = TcpStream::connect(server.addr).await.unwrap();
    let reply = transact(&mut writer, &request(&write_registers_pdu(100, &[7, 9, 3]))).await;
    assert!(!is_exception(&reply));

    // a second connection observes the write immediately
    let mut reader = TcpStream::connect(server.addr).await.unwrap();
    let reply = transact(&mut reader, &request(&read_holdings_pdu(100, 3))).await;
    assert!(!is_exception(&reply));
    assert_eq!(&reply[9..], &[0u8, 7, 0, 9, 0, 3][..]);

    // the backing table followed, one row per register in the run
    let conn = Connection::open(server.dir.path().join("registers.db")).unwrap();
    for (address, expected) in [(100u16, 7u16), (101, 9), (102, 3)] {
        let (value, modified): (u16, u64) = conn
            .query_row(
                "SELECT value, modified_count FROM registers
                 WHERE reg_type = 4 AND address = ?1",
                [address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(value, expected);
        assert_eq!(modified, 1);
    }
    drop(conn);

    stop_server(server).await;
}

// =============================================================================
// Counter accuracy
// =============================================================================

#[tokio::test]
async fn test_counters_track_responses_and_errors() {
    let server = start_server().await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    let mut second = TcpStream::connect(server.addr).await.unwrap();

    // three good requests...
    let good = request(&read_holdings_pdu(100, 2));
    assert!(!is_exception(&transact(&mut first, &good).await));
    assert!(!is_exception(&transact(&mut second, &good).await));
    assert!(!is_exception(&transact(&mut first, &good).await));

    // ...and two that miss the holding window (exception replies)
    let bad = request(&read_holdings_pdu(0, 2));
    assert!(is_exception(&transact(&mut second, &bad).await));
    assert!(is_exception(&transact(&mut first, &bad).await));

    assert_eq!(server.counters.responses(), 3);
    assert_eq!(server.counters.errors(), 2);
    assert_eq!(server.counters.connections(), 2);

    stop_server(server).await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_stop_handle_ends_the_engine() {
    let server = start_server().await;
    let _probe = TcpStream::connect(server.addr).await.unwrap();
    stop_server(server).await;
}
