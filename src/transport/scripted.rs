//! Deterministic transport that replays pre-recorded replies.
//!
//! Writes and reads each consume the next entry of their own queue. Once a
//! queue runs dry the fallback reply is used: by default writes are accepted
//! in full and reads report `Closed`.
//! Every call is recorded so tests can assert on exact call sequences.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{
    Credentials, ReadStatus, SessionHandle, StreamHandle, Transport, TransportError, WriteStatus,
};

/// Scripted reply to a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedWrite {
    /// Accept everything offered.
    Accept,
    /// Accept at most this many bytes.
    AcceptUpTo(usize),
    WouldBlock,
    Fail(i32),
}

/// Scripted reply to a read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    /// Bytes to hand out. Longer than the requested length means the rest
    /// stays queued for the next read.
    Data(Vec<u8>),
    /// Zero-length success.
    Empty,
    Closed,
    Invalid,
    Fail(i32),
}

/// A transport call as observed by the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenSession,
    CloseSession,
    OpenStream(String),
    CloseStream,
    /// Length offered to the transport.
    Write(usize),
    Read,
    Release(usize),
    ConnectionType,
    FinishWrite,
}

#[derive(Default)]
struct Failures {
    open_session: Option<i32>,
    close_session: Option<i32>,
    open_stream: Option<i32>,
    close_stream: Option<i32>,
    connection_type: Option<i32>,
}

pub struct ScriptedTransport {
    writes: Mutex<VecDeque<ScriptedWrite>>,
    reads: Mutex<VecDeque<ScriptedRead>>,
    calls: Mutex<Vec<Call>>,
    written: Mutex<Vec<u8>>,
    write_fallback: ScriptedWrite,
    read_fallback: ScriptedRead,
    failures: Failures,
    connection_code: i32,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            writes: Mutex::new(VecDeque::new()),
            reads: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            write_fallback: ScriptedWrite::Accept,
            read_fallback: ScriptedRead::Closed,
            failures: Failures::default(),
            connection_code: 0,
        }
    }

    pub fn with_writes(self, writes: impl IntoIterator<Item = ScriptedWrite>) -> Self {
        lock(&self.writes).extend(writes);
        self
    }

    pub fn with_reads(self, reads: impl IntoIterator<Item = ScriptedRead>) -> Self {
        lock(&self.reads).extend(reads);
        self
    }

    /// Reply used for every write once the queue is empty.
    pub fn with_write_fallback(mut self, reply: ScriptedWrite) -> Self {
        self.write_fallback = reply;
        self
    }

    /// Reply used for every read once the queue is empty.
    pub fn with_read_fallback(mut self, reply: ScriptedRead) -> Self {
        self.read_fallback = reply;
        self
    }

    pub fn with_connection_code(mut self, code: i32) -> Self {
        self.connection_code = code;
        self
    }

    pub fn fail_open_session(mut self, code: i32) -> Self {
        self.failures.open_session = Some(code);
        self
    }

    pub fn fail_close_session(mut self, code: i32) -> Self {
        self.failures.close_session = Some(code);
        self
    }

    pub fn fail_open_stream(mut self, code: i32) -> Self {
        self.failures.open_stream = Some(code);
        self
    }

    pub fn fail_close_stream(mut self, code: i32) -> Self {
        self.failures.close_stream = Some(code);
        self
    }

    pub fn fail_connection_type(mut self, code: i32) -> Self {
        self.failures.connection_type = Some(code);
        self
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Number of observed calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    /// Concatenation of every byte the transport accepted.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panicking test thread must not hide the recorded state from others.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check(failure: Option<i32>) -> Result<(), TransportError> {
    match failure {
        Some(code) => Err(TransportError::new(code, "scripted failure")),
        None => Ok(()),
    }
}

impl Transport for ScriptedTransport {
    fn open_session(&self, _credentials: &Credentials) -> Result<SessionHandle, TransportError> {
        self.record(Call::OpenSession);
        check(self.failures.open_session)?;
        Ok(SessionHandle(1))
    }

    fn close_session(&self, _session: SessionHandle) -> Result<(), TransportError> {
        self.record(Call::CloseSession);
        check(self.failures.close_session)
    }

    fn open_stream(
        &self,
        _session: SessionHandle,
        peer_id: &str,
    ) -> Result<StreamHandle, TransportError> {
        self.record(Call::OpenStream(peer_id.to_string()));
        check(self.failures.open_stream)?;
        Ok(StreamHandle(1))
    }

    fn close_stream(&self, _stream: StreamHandle) -> Result<(), TransportError> {
        self.record(Call::CloseStream);
        check(self.failures.close_stream)
    }

    fn write(&self, _stream: StreamHandle, data: &[u8]) -> Result<WriteStatus, TransportError> {
        self.record(Call::Write(data.len()));
        let reply = lock(&self.writes)
            .pop_front()
            .unwrap_or_else(|| self.write_fallback.clone());
        let accepted = match reply {
            ScriptedWrite::Accept => data.len(),
            ScriptedWrite::AcceptUpTo(n) => n.min(data.len()),
            ScriptedWrite::WouldBlock => return Ok(WriteStatus::WouldBlock),
            ScriptedWrite::Fail(code) => {
                return Err(TransportError::new(code, "scripted write failure"))
            }
        };
        lock(&self.written).extend_from_slice(&data[..accepted]);
        Ok(WriteStatus::Accepted(accepted))
    }

    fn read(&self, _stream: StreamHandle, max_len: usize) -> Result<ReadStatus, TransportError> {
        self.record(Call::Read);
        let mut reads = lock(&self.reads);
        match reads
            .pop_front()
            .unwrap_or_else(|| self.read_fallback.clone())
        {
            ScriptedRead::Data(mut bytes) => {
                if bytes.len() > max_len {
                    let rest = bytes.split_off(max_len);
                    reads.push_front(ScriptedRead::Data(rest));
                }
                Ok(ReadStatus::Data(bytes))
            }
            ScriptedRead::Empty => Ok(ReadStatus::Data(Vec::new())),
            ScriptedRead::Closed => Ok(ReadStatus::Closed),
            ScriptedRead::Invalid => Ok(ReadStatus::Invalid),
            ScriptedRead::Fail(code) => Err(TransportError::new(code, "scripted read failure")),
        }
    }

    fn release(&self, _stream: StreamHandle, buf: Vec<u8>) {
        self.record(Call::Release(buf.len()));
    }

    fn connection_type(&self, _stream: StreamHandle) -> Result<i32, TransportError> {
        self.record(Call::ConnectionType);
        check(self.failures.connection_type)?;
        Ok(self.connection_code)
    }

    fn finish_write(&self, _stream: StreamHandle) -> Result<(), TransportError> {
        self.record(Call::FinishWrite);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_accept_writes_and_close_reads() {
        let t = ScriptedTransport::new();
        let s = StreamHandle(1);
        assert_eq!(t.write(s, b"abc").unwrap(), WriteStatus::Accepted(3));
        assert_eq!(t.read(s, 16).unwrap(), ReadStatus::Closed);
        assert_eq!(t.written(), b"abc".to_vec());
    }

    #[test]
    fn test_oversized_data_is_split_across_reads() {
        let t = ScriptedTransport::new().with_reads([ScriptedRead::Data(b"+\n".to_vec())]);
        let s = StreamHandle(1);
        assert_eq!(t.read(s, 1).unwrap(), ReadStatus::Data(b"+".to_vec()));
        assert_eq!(t.read(s, 1).unwrap(), ReadStatus::Data(b"\n".to_vec()));
        assert_eq!(t.read(s, 1).unwrap(), ReadStatus::Closed);
    }

    #[test]
    fn test_partial_accept() {
        let t = ScriptedTransport::new().with_writes([ScriptedWrite::AcceptUpTo(2)]);
        let s = StreamHandle(1);
        assert_eq!(t.write(s, b"abcd").unwrap(), WriteStatus::Accepted(2));
        assert_eq!(t.write(s, b"cd").unwrap(), WriteStatus::Accepted(2));
        assert_eq!(t.written(), b"abcd".to_vec());
        assert_eq!(t.calls(), vec![Call::Write(4), Call::Write(2)]);
    }

    #[test]
    fn test_fallback_replies() {
        let t = ScriptedTransport::new()
            .with_write_fallback(ScriptedWrite::WouldBlock)
            .with_read_fallback(ScriptedRead::Empty);
        let s = StreamHandle(1);
        for _ in 0..3 {
            assert_eq!(t.write(s, b"abc").unwrap(), WriteStatus::WouldBlock);
            assert_eq!(t.read(s, 16).unwrap(), ReadStatus::Data(Vec::new()));
        }
        assert!(t.written().is_empty());
    }

    #[test]
    fn test_scripted_failures() {
        let t = ScriptedTransport::new().fail_open_stream(1003);
        let err = t.open_stream(SessionHandle(1), "dev1").unwrap_err();
        assert_eq!(err.code, 1003);
    }
}
