//! [`Transport`] over plain TCP using non-blocking `std::net` sockets.
//!
//! A session only remembers its credentials; every stream is its own TCP
//! connection to the peer id, which is either `host` (the transport's
//! default port is used) or `host:port`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    ConnectionType, Credentials, ReadStatus, SessionHandle, StreamHandle, Transport,
    TransportError, WriteStatus,
};

/// Port the echo peer listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 7878;

/// Status codes for failures that have no OS error behind them.
pub const STATUS_INVALID_SESSION: i32 = -2;
pub const STATUS_INVALID_STREAM: i32 = -3;
pub const STATUS_NO_ADDRESS: i32 = -4;
pub const STATUS_IO: i32 = -1;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_POOLED_BUFFERS: usize = 8;

struct StreamEntry {
    session: SessionHandle,
    socket: Arc<TcpStream>,
}

pub struct TcpTransport {
    default_port: u16,
    connect_timeout: Duration,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionHandle, Credentials>>,
    streams: Mutex<HashMap<StreamHandle, StreamEntry>>,
    pool: Mutex<Vec<Vec<u8>>>,
}

impl TcpTransport {
    pub fn new(default_port: u16) -> Self {
        TcpTransport {
            default_port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn socket(&self, stream: StreamHandle) -> Option<Arc<TcpStream>> {
        lock(&self.streams)
            .get(&stream)
            .map(|entry| Arc::clone(&entry.socket))
    }

    /// Resolves a peer id to candidate socket addresses.
    pub fn resolve(&self, peer_id: &str) -> Result<Vec<SocketAddr>, TransportError> {
        if let Ok(addr) = peer_id.parse::<SocketAddr>() {
            return Ok(vec![addr]);
        }
        let resolved = match peer_id.parse::<IpAddr>() {
            Ok(ip) => Ok(vec![SocketAddr::new(ip, self.default_port)]),
            Err(_) if peer_id.contains(':') => {
                peer_id.to_socket_addrs().map(|addrs| addrs.collect())
            }
            Err(_) => (peer_id, self.default_port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect()),
        };
        let addrs: Vec<SocketAddr> = resolved.map_err(|e| io_error(&e))?;
        if addrs.is_empty() {
            return Err(TransportError::new(
                STATUS_NO_ADDRESS,
                format!("no address found for {}", peer_id),
            ));
        }
        Ok(addrs)
    }

    fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream, TransportError> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    log::debug!("Connecting to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map_or_else(
            || TransportError::new(STATUS_NO_ADDRESS, "no address to connect to"),
            |e| io_error(&e),
        ))
    }

    fn take_buffer(&self, len: usize) -> Vec<u8> {
        let mut buf = lock(&self.pool).pop().unwrap_or_default();
        buf.resize(len, 0);
        buf
    }

    fn recycle(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut pool = lock(&self.pool);
        if pool.len() < MAX_POOLED_BUFFERS {
            pool.push(buf);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn io_error(e: &io::Error) -> TransportError {
    TransportError::new(e.raw_os_error().unwrap_or(STATUS_IO), e.to_string())
}

fn invalid_stream(stream: StreamHandle) -> TransportError {
    TransportError::new(
        STATUS_INVALID_STREAM,
        format!("unknown stream {}", stream.0),
    )
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn is_remote_close(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

/// Classifies a peer address: same host or private ranges count as local.
pub fn classify(addr: IpAddr) -> ConnectionType {
    let local = match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xffc0) == 0xfe80 || (first & 0xfe00) == 0xfc00
        }
    };
    if local {
        ConnectionType::Local
    } else {
        ConnectionType::PeerToPeer
    }
}

impl Transport for TcpTransport {
    fn open_session(&self, credentials: &Credentials) -> Result<SessionHandle, TransportError> {
        let session = SessionHandle(self.next_id());
        log::debug!("Opened session {} for user {}", session.0, credentials.user);
        lock(&self.sessions).insert(session, credentials.clone());
        Ok(session)
    }

    fn close_session(&self, session: SessionHandle) -> Result<(), TransportError> {
        if lock(&self.sessions).remove(&session).is_none() {
            return Err(TransportError::new(
                STATUS_INVALID_SESSION,
                format!("unknown session {}", session.0),
            ));
        }
        // Streams still open under this session go with it.
        lock(&self.streams).retain(|_, entry| entry.session != session);
        Ok(())
    }

    fn open_stream(
        &self,
        session: SessionHandle,
        peer_id: &str,
    ) -> Result<StreamHandle, TransportError> {
        if !lock(&self.sessions).contains_key(&session) {
            return Err(TransportError::new(
                STATUS_INVALID_SESSION,
                format!("unknown session {}", session.0),
            ));
        }

        let addrs = self.resolve(peer_id)?;
        let socket = self.connect(&addrs)?;
        socket.set_nodelay(true).map_err(|e| io_error(&e))?;
        socket.set_nonblocking(true).map_err(|e| io_error(&e))?;

        let stream = StreamHandle(self.next_id());
        log::debug!(
            "Opened stream {} to {} ({:?})",
            stream.0,
            peer_id,
            socket.peer_addr().ok()
        );
        lock(&self.streams).insert(
            stream,
            StreamEntry {
                session,
                socket: Arc::new(socket),
            },
        );
        Ok(stream)
    }

    fn close_stream(&self, stream: StreamHandle) -> Result<(), TransportError> {
        let entry = lock(&self.streams)
            .remove(&stream)
            .ok_or_else(|| invalid_stream(stream))?;
        match entry.socket.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(io_error(&e)),
            _ => Ok(()),
        }
    }

    fn write(&self, stream: StreamHandle, data: &[u8]) -> Result<WriteStatus, TransportError> {
        let socket = self.socket(stream).ok_or_else(|| invalid_stream(stream))?;
        match (&*socket).write(data) {
            Ok(n) => Ok(WriteStatus::Accepted(n)),
            Err(e) if is_transient(&e) => Ok(WriteStatus::WouldBlock),
            Err(e) => Err(io_error(&e)),
        }
    }

    fn read(&self, stream: StreamHandle, max_len: usize) -> Result<ReadStatus, TransportError> {
        let Some(socket) = self.socket(stream) else {
            return Ok(ReadStatus::Invalid);
        };
        if max_len == 0 {
            return Ok(ReadStatus::Data(Vec::new()));
        }

        let mut buf = self.take_buffer(max_len);
        match (&*socket).read(&mut buf) {
            Ok(0) => {
                self.recycle(buf);
                Ok(ReadStatus::Closed)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(ReadStatus::Data(buf))
            }
            Err(e) if is_transient(&e) => {
                self.recycle(buf);
                Ok(ReadStatus::Data(Vec::new()))
            }
            Err(e) if is_remote_close(&e) => {
                self.recycle(buf);
                Ok(ReadStatus::Closed)
            }
            Err(e) => Err(io_error(&e)),
        }
    }

    fn release(&self, _stream: StreamHandle, buf: Vec<u8>) {
        self.recycle(buf);
    }

    fn connection_type(&self, stream: StreamHandle) -> Result<i32, TransportError> {
        let socket = self.socket(stream).ok_or_else(|| invalid_stream(stream))?;
        let peer = socket.peer_addr().map_err(|e| io_error(&e))?;
        Ok(classify(peer.ip()).code())
    }

    fn finish_write(&self, stream: StreamHandle) -> Result<(), TransportError> {
        let socket = self.socket(stream).ok_or_else(|| invalid_stream(stream))?;
        socket.shutdown(Shutdown::Write).map_err(|e| io_error(&e))
    }
}
