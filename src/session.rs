//! Scoped ownership of transport sessions and streams.
//!
//! Both guards close their handle exactly once: explicitly through
//! `close()`, which reports the transport's verdict, or on drop when an
//! early return skipped the explicit close.

use crate::transport::{Credentials, SessionHandle, StreamHandle, Transport, TransportError};

pub struct Session<'t, T: Transport + ?Sized> {
    transport: &'t T,
    handle: SessionHandle,
    closed: bool,
}

impl<'t, T: Transport + ?Sized> Session<'t, T> {
    pub fn open(transport: &'t T, credentials: &Credentials) -> Result<Self, TransportError> {
        let handle = transport.open_session(credentials)?;
        Ok(Session {
            transport,
            handle,
            closed: false,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Opens a stream that cannot outlive this session.
    pub fn open_stream(&self, peer_id: &str) -> Result<Stream<'_, T>, TransportError> {
        let handle = self.transport.open_stream(self.handle, peer_id)?;
        Ok(Stream {
            transport: self.transport,
            handle,
            closed: false,
        })
    }

    pub fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.transport.close_session(self.handle)
    }
}

impl<T: Transport + ?Sized> Drop for Session<'_, T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.transport.close_session(self.handle) {
            log::warn!("Error closing session {}: {}", self.handle.0, e);
        }
    }
}

pub struct Stream<'s, T: Transport + ?Sized> {
    transport: &'s T,
    handle: StreamHandle,
    closed: bool,
}

impl<'s, T: Transport + ?Sized> Stream<'s, T> {
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn transport(&self) -> &'s T {
        self.transport
    }

    pub fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.transport.close_stream(self.handle)
    }
}

impl<T: Transport + ?Sized> Drop for Stream<'_, T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.transport.close_stream(self.handle) {
            log::warn!("Error closing stream {}: {}", self.handle.0, e);
        }
    }
}
