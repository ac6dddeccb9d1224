//! Integration tests for tester-peer communication over loopback.
//!
//! These tests run the echo peer on the localhost interface and drive it
//! with the blocking tester through the TCP transport.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use stream_echo_suite::echo_mode::EchoMode;
use stream_echo_suite::peer::{EchoPeer, PeerCounters};
use stream_echo_suite::tester::{run_test, TestError, TestRequest, TestResult};
use stream_echo_suite::transport::tcp::TcpTransport;
use stream_echo_suite::transport::{ConnectionType, Operation};

use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Starts a peer on an ephemeral port.
async fn start_peer(max_size: u64) -> (SocketAddr, Arc<PeerCounters>) {
    let peer = EchoPeer::bind("127.0.0.1:0".parse().unwrap(), max_size)
        .await
        .expect("Failed to bind peer");
    let addr = peer.local_addr().unwrap();
    let counters = peer.counters();
    tokio::spawn(peer.serve_until(std::future::pending()));
    (addr, counters)
}

/// Runs the blocking tester off the async runtime.
async fn run_client(request: TestRequest) -> Result<TestResult, TestError> {
    let task = tokio::task::spawn_blocking(move || {
        let transport = TcpTransport::new(0).with_connect_timeout(Duration::from_secs(5));
        run_test(&transport, &request)
    });
    timeout(Duration::from_secs(30), task)
        .await
        .expect("Tester timed out")
        .expect("Tester panicked")
}

#[tokio::test]
async fn test_loopback_bidirectional() {
    let (addr, counters) = start_peer(1 << 20).await;

    let request = TestRequest::new(addr.to_string(), 100_000, EchoMode::Bidirectional);
    let result = run_client(request).await.expect("Test run failed");

    assert!(result.is_success());
    assert_eq!(result.exchange.written, 100_000);
    assert_eq!(result.exchange.read, 100_000);
    assert_eq!(result.connection_type, Some(ConnectionType::Local));
    assert!(result.durations.echo.is_some());
    assert!(result.throughput.kbytes_per_sec >= 0.0);
    assert_eq!(counters.sessions_accepted.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_loopback_remote_generated() {
    let (addr, counters) = start_peer(1 << 20).await;

    let request = TestRequest::new(addr.to_string(), 50_000, EchoMode::RemoteGenerated);
    let result = run_client(request).await.expect("Test run failed");

    assert!(result.is_success());
    assert_eq!(result.exchange.written, 0);
    assert_eq!(result.exchange.read, 50_000);
    assert_eq!(counters.bytes_generated.load(Ordering::Relaxed), 50_000);
}

#[tokio::test]
async fn test_loopback_zero_payload() {
    let (addr, _) = start_peer(1 << 20).await;

    let request = TestRequest::new(addr.to_string(), 0, EchoMode::Bidirectional);
    let result = run_client(request).await.expect("Test run failed");

    assert!(result.is_success());
    assert_eq!(result.exchange.written, 0);
    assert_eq!(result.exchange.read, 0);
}

#[tokio::test]
async fn test_loopback_rejected() {
    let (addr, counters) = start_peer(10).await;

    let request = TestRequest::new(addr.to_string(), 100, EchoMode::RemoteGenerated);
    let result = run_client(request).await.expect("Test run failed");

    assert!(!result.is_success());
    assert_eq!(result.exchange.read, 0);
    assert!(result.connection_type.is_none());
    assert_eq!(counters.sessions_rejected.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_loopback_connect_only() {
    let (addr, counters) = start_peer(10).await;

    let mut request = TestRequest::new(addr.to_string(), 4096, EchoMode::Bidirectional);
    request.connect_only = true;
    let result = run_client(request).await.expect("Test run failed");

    assert!(result.is_success());
    assert_eq!(result.connection_type, Some(ConnectionType::Local));
    assert!(result.durations.setup.is_some());
    assert!(result.durations.echo.is_none());
    assert_eq!(counters.sessions_accepted.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_loopback_nobody_listening() {
    // Grab a free port and release it so the connect is refused.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let request = TestRequest::new(addr.to_string(), 10, EchoMode::Bidirectional);
    match run_client(request).await {
        Err(TestError::Transport { op, .. }) => assert_eq!(op, Operation::OpenStream),
        other => panic!("Expected stream open failure, got {:?}", other),
    }
}
