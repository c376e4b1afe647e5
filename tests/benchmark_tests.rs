//! Performance benchmarks for the wire codec and registry

use server::connection::ServerConnection;
use server::manager::ConnectionManager;
use shared::{decode, decode_frame, encode, Packet, ServerId, ServerStatus, MAX_FRAME_LEN};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn busy_status() -> ServerStatus {
    let names: Vec<String> = (0..100).map(|i| format!("player{}", i)).collect();
    ServerStatus::new("Alpha", "1.2.3.4:25565", 100).with_players(names)
}

/// Benchmarks encoding a full status broadcast
#[test]
fn benchmark_status_encode() {
    let packet = Packet::StatusUpdate {
        status: busy_status(),
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = encode(&packet).unwrap();
        assert!(frame.len() > 4);
    }

    let duration = start.elapsed();
    println!(
        "Status encode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding a full status broadcast
#[test]
fn benchmark_status_decode() {
    let packet = Packet::StatusUpdate {
        status: busy_status(),
    };
    let frame = encode(&packet).unwrap();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.kind(), "StatusUpdate");
    }

    let duration = start.elapsed();
    println!(
        "Status decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks splitting a buffer of back-to-back command results
#[test]
fn benchmark_streamed_results() {
    let frames = 10_000;
    let mut buffer = Vec::new();
    for i in 0..frames {
        let packet = Packet::CommandResult {
            command: "tps".to_string(),
            output: format!("{}.0", i % 20),
        };
        buffer.extend_from_slice(&encode(&packet).unwrap());
    }

    let start = Instant::now();
    let mut offset = 0;
    let mut decoded = 0;
    while let Some((_, used)) = decode_frame(&buffer[offset..], MAX_FRAME_LEN).unwrap() {
        offset += used;
        decoded += 1;
    }
    let duration = start.elapsed();

    println!(
        "Streamed decode: {} frames ({} bytes) in {:?}",
        decoded,
        buffer.len(),
        duration
    );

    assert_eq!(decoded, frames);
    assert_eq!(offset, buffer.len());
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks registering many servers and taking snapshots
#[test]
fn benchmark_registry_snapshots() {
    let mut manager = ConnectionManager::new();
    let mut receivers = Vec::new();

    for i in 0..1_000 {
        let (tx, rx) = mpsc::channel(1);
        receivers.push(rx);
        let connection = ServerConnection::new(
            ServerId::new(format!("server{:04}", i)),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        );
        manager
            .register(connection, ServerStatus::new("Server", "", 20).with_players(["a"]))
            .unwrap();
    }

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let summary = manager.summary();
        assert_eq!(summary.servers_online, 1_000);
        assert_eq!(summary.total_players, 1_000);
    }

    let duration = start.elapsed();
    println!(
        "Registry summary of 1000 servers: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 10);
}

/// Compares framed encoding against plain bincode
#[test]
fn benchmark_framing_overhead() {
    let packet = Packet::ExecuteCommand {
        command: "say".to_string(),
        args: vec!["hello".to_string(), "world".to_string()],
    };

    let plain = bincode::serialize(&packet).unwrap();
    let framed = encode(&packet).unwrap();

    println!(
        "Plain bincode: {} bytes, framed: {} bytes",
        plain.len(),
        framed.len()
    );

    // Same fixed-width little-endian layout plus the 4-byte length header
    assert_eq!(framed.len(), plain.len() + 4);
    assert_eq!(&framed[4..], plain.as_slice());
}
