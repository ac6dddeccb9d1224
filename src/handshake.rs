//! Command negotiation preceding the echo exchange.
//!
//! The client sends one command line and the peer answers with a single
//! `+` (accepted) or `-` (rejected) byte followed by `\n`:
//!
//! ```text
//! client -> peer   "echo\n"      or   "<size>\n"
//! peer   -> client "+\n"         or   "-\n"
//! ```

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    backoff::Backoff,
    echo_mode::EchoMode,
    transport::{Operation, ReadStatus, StreamHandle, Transport, TransportError, WriteStatus},
};

pub const ACCEPT: u8 = b'+';
pub const REJECT: u8 = b'-';
pub const LINE_END: u8 = b'\n';

/// Command asking the peer to start a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Echo back whatever the client sends.
    Echo,
    /// Generate this many bytes towards the client.
    Generate(u64),
}

impl Command {
    pub fn for_mode(mode: EchoMode, data_size: u64) -> Self {
        match mode {
            EchoMode::Bidirectional => Command::Echo,
            EchoMode::RemoteGenerated => Command::Generate(data_size),
        }
    }

    /// Wire form including the line terminator.
    pub fn line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Echo => write!(f, "echo"),
            Command::Generate(size) => write!(f, "{}", size),
        }
    }
}

/// Error returned when a command line is not understood.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command {0:?}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    /// Parses a command line without its terminator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches('\r');
        if s == "echo" {
            return Ok(Command::Echo);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(size) = s.parse() {
                return Ok(Command::Generate(size));
            }
        }
        Err(CommandError::Unknown(s.to_string()))
    }
}

/// Peer's verdict on a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Accepted,
    Rejected,
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Received {0:#04x} instead of '+' or '-'")]
    UnexpectedByte(u8),
    #[error("Stream closed before the peer answered the command")]
    Closed,
    #[error("Error while {op}: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: TransportError,
    },
}

impl HandshakeError {
    fn transport(op: Operation) -> impl FnOnce(TransportError) -> Self {
        move |source| HandshakeError::Transport { op, source }
    }
}

/// Sends `command` and waits for the peer's verdict.
///
/// Performs one logical write followed by reads until the verdict's line
/// terminator. Bytes between the verdict and `\n` are discarded.
pub fn negotiate<T: Transport + ?Sized>(
    transport: &T,
    stream: StreamHandle,
    command: &Command,
) -> Result<Handshake, HandshakeError> {
    write_line(transport, stream, command.line().as_bytes())?;

    let verdict = match read_byte(transport, stream)? {
        Some(ACCEPT) => Handshake::Accepted,
        Some(REJECT) => Handshake::Rejected,
        Some(other) => return Err(HandshakeError::UnexpectedByte(other)),
        None => return Err(HandshakeError::Closed),
    };

    loop {
        match read_byte(transport, stream)? {
            Some(LINE_END) | None => break,
            Some(skipped) => log::debug!("Skipping {:#04x} before line end", skipped),
        }
    }

    Ok(verdict)
}

fn write_line<T: Transport + ?Sized>(
    transport: &T,
    stream: StreamHandle,
    line: &[u8],
) -> Result<(), HandshakeError> {
    let mut pending = line;
    let mut backoff = Backoff::new();
    while !pending.is_empty() {
        match transport
            .write(stream, pending)
            .map_err(HandshakeError::transport(Operation::Write))?
        {
            WriteStatus::Accepted(n) if n > 0 => {
                pending = &pending[n.min(pending.len())..];
                backoff.reset();
            }
            WriteStatus::Accepted(_) | WriteStatus::WouldBlock => backoff.wait(),
        }
    }
    Ok(())
}

/// Reads a single byte, or `None` once the stream is closed or invalid.
fn read_byte<T: Transport + ?Sized>(
    transport: &T,
    stream: StreamHandle,
) -> Result<Option<u8>, HandshakeError> {
    let mut backoff = Backoff::new();
    loop {
        match transport
            .read(stream, 1)
            .map_err(HandshakeError::transport(Operation::Read))?
        {
            ReadStatus::Data(buf) => match buf.first().copied() {
                Some(byte) => {
                    transport.release(stream, buf);
                    return Ok(Some(byte));
                }
                None => backoff.wait(),
            },
            ReadStatus::Closed | ReadStatus::Invalid => return Ok(None),
        }
    }
}
