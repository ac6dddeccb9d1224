//! Stream Echo Suite - connection latency and stream throughput tester.
//!
//! A client opens a session and a stream to a remote peer, negotiates an
//! echo test with a one-line text command, then pushes and/or pulls a
//! payload across the stream while timing every phase.
//!
//! # Usage
//!
//! Run the tester (client):
//! ```bash
//! stream-echo 192.168.1.1 1048576 --mode echo
//! ```
//!
//! Run the echo peer (server):
//! ```bash
//! stream-echod --local-addr 0.0.0.0 --local-port 7878
//! ```

/// Bounded busy-poll backoff.
pub mod backoff;
/// Command-line configuration and validation.
pub mod configuration;
/// Which side produces the test payload.
pub mod echo_mode;
/// Command/verdict exchange preceding the echo test.
pub mod handshake;
/// Checkpoints, durations and throughput.
pub mod metrics;
/// Echo peer answering test sessions.
pub mod peer;
/// Concurrent reader/writer exchange.
pub mod runner;
/// Scoped session and stream ownership.
pub mod session;
/// Report formatting.
pub mod stats;
/// Test run orchestration.
pub mod tester;
/// Transport abstraction and implementations.
pub mod transport;
