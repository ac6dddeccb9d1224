//! Bulk data exchange over an accepted stream.
//!
//! In bidirectional mode the payload is written from the caller's thread
//! while a scoped reader thread drains whatever the peer sends back. The
//! reader is joined once the writer has pushed the whole payload. Each
//! direction owns its byte counter; the counts only cross threads through
//! the join. A fatal error on either side raises a shared stop flag so the
//! other side gives up instead of polling a dead stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use thiserror::Error;

use crate::{
    backoff::Backoff,
    echo_mode::EchoMode,
    transport::{Operation, ReadStatus, StreamHandle, Transport, TransportError, WriteStatus},
};

/// Size of a single write attempt unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
/// Upper bound on bytes requested per read.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Byte counts of a finished exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Exchange {
    pub written: u64,
    pub read: u64,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Error while {op}: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: TransportError,
    },
    #[error("Cannot start reader thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Reader thread panicked")]
    ReaderPanicked,
}

impl RunnerError {
    fn transport(op: Operation) -> impl FnOnce(TransportError) -> Self {
        move |source| RunnerError::Transport { op, source }
    }
}

pub struct EchoRunner<'a, T: Transport + ?Sized> {
    transport: &'a T,
    stream: StreamHandle,
    chunk_size: usize,
}

impl<'a, T: Transport + ?Sized> EchoRunner<'a, T> {
    pub fn new(transport: &'a T, stream: StreamHandle) -> Self {
        EchoRunner {
            transport,
            stream,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the write chunk size; zero is bumped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Runs the exchange for `mode` and returns the per-direction counts.
    ///
    /// In bidirectional mode exactly `payload_size` bytes are written and the
    /// read side runs until the transport reports the stream closed or
    /// invalid. In remote-generated mode nothing is written and reading stops
    /// after `payload_size` bytes or at closure, whichever comes first.
    pub fn run(&self, mode: EchoMode, payload_size: u64) -> Result<Exchange, RunnerError> {
        match mode {
            EchoMode::RemoteGenerated => Ok(Exchange {
                written: 0,
                read: self.read_loop(Some(payload_size), &AtomicBool::new(false))?,
            }),
            EchoMode::Bidirectional => self.run_bidirectional(payload_size),
        }
    }

    fn run_bidirectional(&self, payload_size: u64) -> Result<Exchange, RunnerError> {
        let payload = vec![0u8; self.chunk_size];
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            let reader = thread::Builder::new()
                .name("echo-reader".to_string())
                .spawn_scoped(scope, || {
                    let read = self.read_loop(None, &stop);
                    if read.is_err() {
                        stop.store(true, Ordering::Release);
                    }
                    read
                })
                .map_err(RunnerError::Spawn)?;

            let written = self
                .write_loop(&payload, payload_size, &stop)
                .and_then(|written| {
                    // After a reader failure nobody drains the stream any more.
                    if !stop.load(Ordering::Acquire) {
                        self.transport
                            .finish_write(self.stream)
                            .map_err(RunnerError::transport(Operation::FinishWrite))?;
                    }
                    Ok(written)
                });
            if written.is_err() {
                stop.store(true, Ordering::Release);
            }

            let read = reader.join().map_err(|_| RunnerError::ReaderPanicked)?;

            match (written, read) {
                (Ok(written), Ok(read)) => Ok(Exchange { written, read }),
                (Err(e), read) => {
                    if let Err(read_err) = read {
                        log::debug!("Reader also failed: {}", read_err);
                    }
                    Err(e)
                }
                (Ok(_), Err(e)) => Err(e),
            }
        })
    }

    /// Writes `payload_size` bytes in chunks taken from `payload`, or fewer
    /// if `stop` is raised first. Returns the number of bytes accepted.
    fn write_loop(
        &self,
        payload: &[u8],
        payload_size: u64,
        stop: &AtomicBool,
    ) -> Result<u64, RunnerError> {
        let mut remaining = payload_size;
        let mut backoff = Backoff::new();

        while remaining > 0 {
            if stop.load(Ordering::Acquire) {
                log::debug!("Reader failed, abandoning {} unwritten bytes", remaining);
                break;
            }
            let len = remaining.min(payload.len() as u64) as usize;
            match self
                .transport
                .write(self.stream, &payload[..len])
                .map_err(RunnerError::transport(Operation::Write))?
            {
                WriteStatus::Accepted(n) if n > 0 => {
                    remaining -= n.min(len) as u64;
                    backoff.reset();
                }
                // Buffer full: same chunk again, remaining untouched.
                WriteStatus::Accepted(_) | WriteStatus::WouldBlock => backoff.wait(),
            }
        }

        Ok(payload_size - remaining)
    }

    /// Reads until the stream ends, `target` bytes have arrived or `stop` is
    /// raised.
    fn read_loop(&self, target: Option<u64>, stop: &AtomicBool) -> Result<u64, RunnerError> {
        let mut read: u64 = 0;
        let mut backoff = Backoff::new();

        loop {
            if stop.load(Ordering::Acquire) {
                log::debug!("Writer failed, reader stopping after {} bytes", read);
                break;
            }
            let max_len = match target {
                Some(target) if read >= target => break,
                Some(target) => (target - read).min(READ_CHUNK_SIZE as u64) as usize,
                None => READ_CHUNK_SIZE,
            };

            match self
                .transport
                .read(self.stream, max_len)
                .map_err(RunnerError::transport(Operation::Read))?
            {
                status @ (ReadStatus::Closed | ReadStatus::Invalid) => {
                    log::info!(
                        "Stream closed by remote peer with status {:?} after {} bytes",
                        status,
                        read
                    );
                    break;
                }
                ReadStatus::Data(buf) if buf.is_empty() => backoff.wait(),
                ReadStatus::Data(buf) => {
                    read += buf.len() as u64;
                    self.transport.release(self.stream, buf);
                    backoff.reset();
                }
            }
        }

        Ok(read)
    }
}
