//! One complete echo test run against a remote peer.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    echo_mode::EchoMode,
    handshake::{self, Command, Handshake, HandshakeError},
    metrics::{Checkpoint, Durations, RunTimer, Throughput},
    runner::{EchoRunner, Exchange, RunnerError, DEFAULT_CHUNK_SIZE},
    session::Session,
    transport::{
        ConnectionType, Credentials, Operation, StreamHandle, Transport, TransportError,
    },
};

/// What to test and against whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub peer_id: String,
    /// Payload size in bytes.
    pub data_size: u64,
    pub mode: EchoMode,
    pub chunk_size: usize,
    pub credentials: Credentials,
    /// Only open and close the stream, skipping handshake and exchange.
    pub connect_only: bool,
}

impl TestRequest {
    pub fn new(peer_id: impl Into<String>, data_size: u64, mode: EchoMode) -> Self {
        TestRequest {
            peer_id: peer_id.into(),
            data_size,
            mode,
            chunk_size: DEFAULT_CHUNK_SIZE,
            credentials: Credentials::guest(),
            connect_only: false,
        }
    }
}

/// Everything measured during a run.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub peer_id: String,
    pub mode: EchoMode,
    pub data_size: u64,
    pub connect_only: bool,
    pub started_at: DateTime<Utc>,
    /// False when the peer rejected the command.
    pub accepted: bool,
    pub connection_type: Option<ConnectionType>,
    pub exchange: Exchange,
    pub durations: Durations,
    pub throughput: Throughput,
}

impl TestResult {
    pub fn is_success(&self) -> bool {
        self.accepted
    }
}

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Error while {op}: {source}")]
    Session {
        op: Operation,
        #[source]
        source: TransportError,
    },
    #[error("Error while {op}: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: TransportError,
    },
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl TestError {
    fn session(op: Operation) -> impl FnOnce(TransportError) -> Self {
        move |source| TestError::Session { op, source }
    }

    fn transport(op: Operation) -> impl FnOnce(TransportError) -> Self {
        move |source| TestError::Transport { op, source }
    }
}

/// Runs one test: session, stream, handshake, exchange, teardown.
///
/// A rejected command is not an error; it yields a result with
/// `accepted == false` and no exchange. Session and stream are closed on
/// every path out of this function.
pub fn run_test<T: Transport + ?Sized>(
    transport: &T,
    request: &TestRequest,
) -> Result<TestResult, TestError> {
    let started_at = Utc::now();
    let mut timer = RunTimer::start();

    let session = Session::open(transport, &request.credentials)
        .map_err(TestError::session(Operation::OpenSession))?;
    timer.mark(Checkpoint::SessionOpened);

    let stream = session
        .open_stream(&request.peer_id)
        .map_err(TestError::transport(Operation::OpenStream))?;
    timer.mark(Checkpoint::StreamOpened);
    log::info!("Stream opened to {}", request.peer_id);

    let mut accepted = true;
    let mut connection_type = None;
    let mut exchange = Exchange::default();

    if request.connect_only {
        connection_type = Some(classify(transport, stream.handle())?);
    } else {
        let command = Command::for_mode(request.mode, request.data_size);
        log::info!("Sending {} command...", command);

        match handshake::negotiate(transport, stream.handle(), &command)? {
            Handshake::Rejected => {
                log::warn!("Command not accepted.");
                accepted = false;
            }
            Handshake::Accepted => {
                log::info!("Command accepted.");
                connection_type = Some(classify(transport, stream.handle())?);

                log::info!("Running echo test...");
                timer.mark(Checkpoint::ExchangeStart);
                exchange = EchoRunner::new(transport, stream.handle())
                    .with_chunk_size(request.chunk_size)
                    .run(request.mode, request.data_size)?;
                timer.mark(Checkpoint::ExchangeEnd);
            }
        }
    }

    stream
        .close()
        .map_err(TestError::transport(Operation::CloseStream))?;
    timer.mark(Checkpoint::StreamClosed);

    session
        .close()
        .map_err(TestError::session(Operation::CloseSession))?;
    timer.mark(Checkpoint::End);

    let durations = timer.durations();
    Ok(TestResult {
        peer_id: request.peer_id.clone(),
        mode: request.mode,
        data_size: request.data_size,
        connect_only: request.connect_only,
        started_at,
        accepted,
        connection_type,
        exchange,
        durations,
        throughput: Throughput::from_bytes(exchange.read, durations.echo),
    })
}

fn classify<T: Transport + ?Sized>(
    transport: &T,
    stream: StreamHandle,
) -> Result<ConnectionType, TestError> {
    let code = transport
        .connection_type(stream)
        .map_err(TestError::transport(Operation::ConnectionType))?;
    let connection_type = ConnectionType::from_code(code);
    log::info!("Connection type with remote device: [{}]", connection_type);
    Ok(connection_type)
}
