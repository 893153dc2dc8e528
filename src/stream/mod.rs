//! # Stream Server Module
//!
//! Single-client TCP server delivering length-prefixed camera frames.
//!
//! This module handles:
//! - Binding the listening socket (default `0.0.0.0:10000`)
//! - Accepting exactly one client per process lifetime
//! - Writing frames with the length prefix flushed ahead of the payload
//! - Sending the zero-length terminator on graceful shutdown
//! - Releasing the connection, then the listener, on every exit path

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::protocol::encoder::{encode_length_prefix, encode_terminator};

/// Default stream port
pub const DEFAULT_STREAM_PORT: u16 = 10_000;

/// Pending connections allowed on the listening socket
const LISTEN_BACKLOG: u32 = 1;

/// Destination for binary frames
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one non-empty payload as a frame
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Send the terminator frame and release the transport
    async fn terminate(&mut self) -> Result<()>;

    /// Release the transport without a terminator
    async fn close(&mut self);
}

/// Writes frames to any async byte stream
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Number of data frames written
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Payload bytes written
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Write one frame
    ///
    /// The length prefix is flushed before the payload is written so a reader
    /// on a slow link learns the frame size immediately.
    ///
    /// # Errors
    ///
    /// Returns `Frame` error for an empty payload and `Stream` error for any
    /// write failure (typically the client disconnected).
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let prefix = encode_length_prefix(payload)?;

        self.writer
            .write_all(&prefix)
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to write frame length: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to flush frame length: {}", e)))?;

        self.writer
            .write_all(payload)
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to write frame payload: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to flush frame payload: {}", e)))?;

        self.frames_sent += 1;
        self.bytes_sent += payload.len() as u64;
        debug!("Sent frame {} ({} bytes)", self.frames_sent, payload.len());
        Ok(())
    }

    /// Write the terminator frame and shut down the write half
    pub async fn terminate(&mut self) -> Result<()> {
        self.writer
            .write_all(&encode_terminator())
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to write terminator: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TelemetryError::Stream(format!("Failed to flush terminator: {}", e)))?;
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Stream shutdown failed: {}", e);
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameTransport for FrameWriter<W> {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        FrameWriter::send(self, payload).await
    }

    async fn terminate(&mut self) -> Result<()> {
        FrameWriter::terminate(self).await
    }

    async fn close(&mut self) {
        self.shutdown().await;
    }
}

/// Single-client frame server
///
/// Fields are declared so that the connection is dropped before the listener.
pub struct StreamServer {
    connection: Option<FrameWriter<TcpStream>>,
    peer: Option<SocketAddr>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
}

impl std::fmt::Debug for StreamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamServer")
            .field("local_addr", &self.local_addr)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl StreamServer {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns `Stream` error if the address cannot be bound; bind failures are
    /// fatal and never retried.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| TelemetryError::Stream(format!("Failed to create socket: {}", e)))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| TelemetryError::Stream(format!("Failed to set SO_REUSEADDR: {}", e)))?;
        socket
            .bind(addr)
            .map_err(|e| TelemetryError::Stream(format!("Failed to bind {}: {}", addr, e)))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TelemetryError::Stream(format!("Failed to listen on {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        info!("Stream server listening on {}", local_addr);
        Ok(Self {
            connection: None,
            peer: None,
            listener: Some(listener),
            local_addr,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the connected client, once accepted
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Wait for the one client of this session
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires while waiting, and `Stream` error if
    /// a client was already accepted or the accept call fails.
    pub async fn accept(&mut self, cancel: &CancellationToken) -> Result<SocketAddr> {
        if self.connection.is_some() {
            return Err(TelemetryError::Stream(
                "client already connected; only one connection per session".to_string(),
            ));
        }
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TelemetryError::Stream("listener already released".to_string()))?;

        info!("Waiting for stream client on {}", self.local_addr);
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return Err(TelemetryError::Cancelled),
            accepted = listener.accept() => accepted
                .map_err(|e| TelemetryError::Stream(format!("Failed to accept client: {}", e)))?,
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        info!("Stream client connected: {}", peer);
        self.connection = Some(FrameWriter::new(stream));
        self.peer = Some(peer);
        Ok(peer)
    }

    fn connection(&mut self) -> Result<&mut FrameWriter<TcpStream>> {
        self.connection
            .as_mut()
            .ok_or_else(|| TelemetryError::Stream("no client connected".to_string()))
    }

    /// Drop the connection, then the listener
    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(
                "Releasing client connection ({} frames, {} bytes)",
                connection.frames_sent(),
                connection.bytes_sent()
            );
        }
        if self.listener.take().is_some() {
            debug!("Released listener on {}", self.local_addr);
        }
    }
}

#[async_trait]
impl FrameTransport for StreamServer {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.connection()?.send(payload).await
    }

    async fn terminate(&mut self) -> Result<()> {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.terminate().await,
            None => Ok(()),
        };
        self.release();
        info!("Stream on {} terminated", self.local_addr);
        result
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.shutdown().await;
        }
        self.release();
        info!("Stream on {} closed without terminator", self.local_addr);
    }
}
