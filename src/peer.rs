//! Echo peer: the server side of the echo test protocol over TCP.
//!
//! Each connection sends one command line. `echo` is answered with `+\n`
//! and everything received afterwards is sent back until the client
//! finishes writing. A decimal size up to the configured maximum is
//! answered with `+\n` followed by that many zero bytes. Anything else
//! gets `-\n`. The peer closes the connection when done.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    handshake::{Command, ACCEPT, LINE_END, REJECT},
    stats::PeerStats,
};

/// Longest command line accepted, terminator included.
pub const MAX_COMMAND_LEN: u64 = 64;

const GENERATE_CHUNK: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Cannot bind to address {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Command line longer than {MAX_COMMAND_LEN} bytes")]
    CommandTooLong,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Aggregate counters for the peer.
#[derive(Debug, Default)]
pub struct PeerCounters {
    pub sessions_accepted: AtomicU64,
    pub sessions_rejected: AtomicU64,
    pub bytes_echoed: AtomicU64,
    pub bytes_generated: AtomicU64,
}

impl PeerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, uptime_seconds: f64) -> PeerStats {
        PeerStats {
            sessions_accepted: self.sessions_accepted.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            bytes_echoed: self.bytes_echoed.load(Ordering::Relaxed),
            bytes_generated: self.bytes_generated.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }
}

pub struct EchoPeer {
    listener: TcpListener,
    max_size: u64,
    counters: Arc<PeerCounters>,
    started: Instant,
}

impl EchoPeer {
    pub async fn bind(addr: SocketAddr, max_size: u64) -> Result<Self, PeerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PeerError::Bind { addr, source })?;
        Ok(EchoPeer {
            listener,
            max_size,
            counters: Arc::new(PeerCounters::new()),
            started: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn counters(&self) -> Arc<PeerCounters> {
        Arc::clone(&self.counters)
    }

    /// Accepts connections until `shutdown` resolves and returns the summary.
    pub async fn serve_until<F>(self, shutdown: F) -> PeerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, remote)) => {
                        let counters = Arc::clone(&self.counters);
                        let max_size = self.max_size;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, max_size, &counters).await {
                                log::warn!("Session with {} failed: {}", remote, e);
                            }
                        });
                    }
                    Err(e) => log::warn!("Accept failed: {}", e),
                },
            }
        }

        self.counters
            .snapshot(self.started.elapsed().as_secs_f64())
    }
}

/// Serves a single test session on `socket`.
pub async fn handle_connection(
    socket: TcpStream,
    max_size: u64,
    counters: &PeerCounters,
) -> Result<(), PeerError> {
    let remote = socket.peer_addr().ok();
    socket.set_nodelay(true)?;
    let mut reader = BufReader::new(socket);

    let mut line = Vec::new();
    (&mut reader)
        .take(MAX_COMMAND_LEN)
        .read_until(LINE_END, &mut line)
        .await?;
    if line.is_empty() {
        log::debug!("{:?} closed before sending a command", remote);
        return Ok(());
    }
    if line.last() != Some(&LINE_END) {
        reject(&mut reader, counters).await?;
        if line.len() as u64 == MAX_COMMAND_LEN {
            return Err(PeerError::CommandTooLong);
        }
        log::debug!("{:?} closed in the middle of a command", remote);
        return Ok(());
    }
    line.pop();

    let command = String::from_utf8_lossy(&line).parse::<Command>();
    match command {
        Ok(Command::Echo) => {
            log::info!("{:?}: echo session", remote);
            accept(&mut reader, counters).await?;
            let (mut rd, mut wr) = tokio::io::split(reader);
            let echoed = tokio::io::copy(&mut rd, &mut wr).await?;
            counters.bytes_echoed.fetch_add(echoed, Ordering::Relaxed);
            wr.shutdown().await?;
            log::info!("{:?}: echoed {} bytes", remote, echoed);
        }
        Ok(Command::Generate(size)) if size <= max_size => {
            log::info!("{:?}: generating {} bytes", remote, size);
            accept(&mut reader, counters).await?;
            let socket = reader.get_mut();
            let chunk = vec![0u8; GENERATE_CHUNK];
            let mut remaining = size;
            while remaining > 0 {
                let len = remaining.min(GENERATE_CHUNK as u64) as usize;
                socket.write_all(&chunk[..len]).await?;
                remaining -= len as u64;
                counters
                    .bytes_generated
                    .fetch_add(len as u64, Ordering::Relaxed);
            }
            socket.shutdown().await?;
        }
        Ok(Command::Generate(size)) => {
            log::warn!(
                "{:?}: requested {} bytes, limit is {}",
                remote,
                size,
                max_size
            );
            reject(&mut reader, counters).await?;
        }
        Err(e) => {
            log::warn!("{:?}: {}", remote, e);
            reject(&mut reader, counters).await?;
        }
    }

    Ok(())
}

async fn accept(reader: &mut BufReader<TcpStream>, counters: &PeerCounters) -> io::Result<()> {
    reader.get_mut().write_all(&[ACCEPT, LINE_END]).await?;
    counters.sessions_accepted.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

async fn reject(reader: &mut BufReader<TcpStream>, counters: &PeerCounters) -> io::Result<()> {
    counters.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    let socket = reader.get_mut();
    socket.write_all(&[REJECT, LINE_END]).await?;
    socket.shutdown().await
}
