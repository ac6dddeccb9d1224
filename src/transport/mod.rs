//! Session-oriented stream transport consumed by the echo tester.
//!
//! The tester never talks to a concrete network stack. Everything it needs
//! (sessions, streams, non-blocking reads and writes, path classification)
//! goes through the [`Transport`] trait, and the handles it receives are
//! opaque ids owned by the implementation.
//!
//! [`tcp::TcpTransport`] is the plain TCP implementation used by the
//! `stream-echo` binary. Unit tests drive the tester through a scripted
//! transport with deterministic replies.

#[cfg(test)]
pub mod scripted;
pub mod tcp;

use std::fmt;

use thiserror::Error;

/// Opaque reference to an authenticated connection context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Opaque reference to an open bidirectional byte stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

/// Login used when opening a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Anonymous guest login with an empty password.
    pub fn guest() -> Self {
        Credentials::new("guest", "")
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::guest()
    }
}

/// Outcome of a single write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The transport took this many bytes from the front of the buffer.
    Accepted(usize),
    /// Send buffer is full; retry the same bytes later.
    WouldBlock,
}

/// Outcome of a single non-blocking read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes received. May be empty when nothing is pending yet.
    Data(Vec<u8>),
    /// The remote side closed the stream.
    Closed,
    /// The stream handle is no longer valid.
    Invalid,
}

/// Error reported by the transport, carrying its raw status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("status {code} ({reason})")]
pub struct TransportError {
    pub code: i32,
    pub reason: String,
}

impl TransportError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        TransportError {
            code,
            reason: reason.into(),
        }
    }
}

/// Transport call that failed, used to label diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    OpenSession,
    CloseSession,
    OpenStream,
    CloseStream,
    Write,
    Read,
    ConnectionType,
    FinishWrite,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::OpenSession => write!(f, "creating session"),
            Operation::CloseSession => write!(f, "closing session"),
            Operation::OpenStream => write!(f, "opening stream"),
            Operation::CloseStream => write!(f, "closing stream"),
            Operation::Write => write!(f, "writing to stream"),
            Operation::Read => write!(f, "reading from stream"),
            Operation::ConnectionType => write!(f, "querying connection type"),
            Operation::FinishWrite => write!(f, "finishing stream writes"),
        }
    }
}

/// Physical path a stream was established over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Local,
    PeerToPeer,
    Relay,
    Other(i32),
}

impl ConnectionType {
    pub const LOCAL_CODE: i32 = 0;
    pub const P2P_CODE: i32 = 1;
    pub const RELAY_CODE: i32 = 2;

    /// Maps a transport classification code, keeping unknown codes as `Other`.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::LOCAL_CODE => ConnectionType::Local,
            Self::P2P_CODE => ConnectionType::PeerToPeer,
            Self::RELAY_CODE => ConnectionType::Relay,
            other => ConnectionType::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            ConnectionType::Local => Self::LOCAL_CODE,
            ConnectionType::PeerToPeer => Self::P2P_CODE,
            ConnectionType::Relay => Self::RELAY_CODE,
            ConnectionType::Other(code) => code,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionType::Local => write!(f, "Local network"),
            ConnectionType::PeerToPeer => write!(f, "P2P"),
            ConnectionType::Relay => write!(f, "Relay"),
            ConnectionType::Other(code) => write!(f, "other ({})", code),
        }
    }
}

impl serde::Serialize for ConnectionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Capability set the echo tester needs from a session-oriented transport.
///
/// Implementations must tolerate one thread calling [`Transport::write`] while
/// another calls [`Transport::read`] on the same stream; the tester adds no
/// locking around the handle.
pub trait Transport: Sync {
    fn open_session(&self, credentials: &Credentials) -> Result<SessionHandle, TransportError>;

    fn close_session(&self, session: SessionHandle) -> Result<(), TransportError>;

    /// Opens a stream to `peer_id` within `session`.
    fn open_stream(
        &self,
        session: SessionHandle,
        peer_id: &str,
    ) -> Result<StreamHandle, TransportError>;

    fn close_stream(&self, stream: StreamHandle) -> Result<(), TransportError>;

    /// Offers `data` to the stream without blocking.
    fn write(&self, stream: StreamHandle, data: &[u8]) -> Result<WriteStatus, TransportError>;

    /// Returns at most `max_len` pending bytes without blocking.
    fn read(&self, stream: StreamHandle, max_len: usize) -> Result<ReadStatus, TransportError>;

    /// Hands a buffer obtained from [`Transport::read`] back for reuse.
    fn release(&self, _stream: StreamHandle, _buf: Vec<u8>) {}

    /// Raw classification code, see [`ConnectionType::from_code`].
    fn connection_type(&self, stream: StreamHandle) -> Result<i32, TransportError>;

    /// Signals that no more bytes will be written to the stream.
    fn finish_write(&self, _stream: StreamHandle) -> Result<(), TransportError> {
        Ok(())
    }
}
