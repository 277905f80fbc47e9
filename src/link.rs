//! Vehicle link: one stream (TCP) and one datagram (UDP) transport.
//!
//! The manager owns both socket handles. They are opened together by
//! [`LinkManager::connect`] and released together by [`LinkManager::close`];
//! a read error on either transport is the caller's cue to close and
//! reconnect before reading again.
//!
//! Reads are non-blocking (`try_read` / `try_recv_from`) and are meant to be
//! preceded by [`LinkManager::poll`], which waits for readiness of a single
//! transport with a timeout.

use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{info, trace, warn};

pub const DEFAULT_STREAM_ADDR: &str = "127.0.0.1";
pub const DEFAULT_STREAM_PORT: u16 = 2011;
pub const DEFAULT_DATAGRAM_LISTEN_PORT: u16 = 2010;
pub const DEFAULT_DATAGRAM_ADDR: &str = "127.0.0.1";
pub const DEFAULT_DATAGRAM_PORT: u16 = 2010;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub stream_addr: String,
    pub stream_port: u16,
    pub datagram_listen_port: u16,
    pub datagram_addr: String,
    pub datagram_port: u16,
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            stream_addr: DEFAULT_STREAM_ADDR.to_string(),
            stream_port: DEFAULT_STREAM_PORT,
            datagram_listen_port: DEFAULT_DATAGRAM_LISTEN_PORT,
            datagram_addr: DEFAULT_DATAGRAM_ADDR.to_string(),
            datagram_port: DEFAULT_DATAGRAM_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Stream,
    Datagram,
}

impl core::fmt::Display for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Transport::Stream => write!(f, "TCP"),
            Transport::Datagram => write!(f, "UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connected,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect {transport} to {target}: {source}")]
    Connect {
        transport: Transport,
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {target}")]
    Timeout { target: String },
    #[error("{0} connection closed by peer")]
    ConnectionClosed(Transport),
    #[error("{0} transport is not connected")]
    NotConnected(Transport),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct LinkManager {
    config: LinkConfig,
    stream: Option<TcpStream>,
    datagram: Option<UdpSocket>,
    generation: u64,
    last_peer: Option<SocketAddr>,
}

impl LinkManager {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            stream: None,
            datagram: None,
            generation: 0,
            last_peer: None,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Opens the stream transport, then binds the datagram port. On any
    /// failure both handles are released and the link stays Disconnected.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        self.close();

        match self.open().await {
            Ok((stream, datagram)) => {
                self.stream = Some(stream);
                self.datagram = Some(datagram);
                self.generation += 1;
                info!(
                    "link up: TCP {}:{}, UDP listening on {} (generation {})",
                    self.config.stream_addr,
                    self.config.stream_port,
                    self.config.datagram_listen_port,
                    self.generation
                );
                Ok(())
            }
            Err(e) => {
                warn!("link connect failed: {}", e);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<(TcpStream, UdpSocket), LinkError> {
        let target = format!("{}:{}", self.config.stream_addr, self.config.stream_port);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(LinkError::Connect {
                    transport: Transport::Stream,
                    target,
                    source,
                })
            }
            Err(_) => return Err(LinkError::Timeout { target }),
        };
        stream.set_nodelay(true)?;

        // The stream is dropped here if the bind fails.
        let port = self.config.datagram_listen_port;
        let datagram = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|source| LinkError::Bind { port, source })?;

        Ok((stream, datagram))
    }

    /// Releases both handles. Safe to call in any state.
    pub fn close(&mut self) {
        let had_link = self.stream.take().is_some() | self.datagram.take().is_some();
        if had_link {
            info!("link closed (generation {})", self.generation);
        }
    }

    pub fn state(&self) -> LinkState {
        if self.stream.is_some() && self.datagram.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    pub fn is_connected(&self, transport: Transport) -> bool {
        match transport {
            Transport::Stream => self.stream.is_some(),
            Transport::Datagram => self.datagram.is_some(),
        }
    }

    /// Number of successful connects so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn local_datagram_addr(&self) -> Option<SocketAddr> {
        self.datagram.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    pub fn local_stream_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|stream| stream.local_addr().ok())
    }

    pub fn last_datagram_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    /// Waits up to `timeout` for `transport` to become readable. A missing
    /// handle or a readiness error both report not ready.
    pub async fn poll(&self, transport: Transport, timeout: Duration) -> bool {
        let ready = match transport {
            Transport::Stream => match &self.stream {
                Some(stream) => tokio::time::timeout(timeout, stream.readable()).await,
                None => return false,
            },
            Transport::Datagram => match &self.datagram {
                Some(socket) => tokio::time::timeout(timeout, socket.readable()).await,
                None => return false,
            },
        };

        matches!(ready, Ok(Ok(())))
    }

    /// Reads whatever the stream has buffered. Zero means a spurious wakeup,
    /// not end of stream.
    pub fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or(LinkError::NotConnected(Transport::Stream))?;

        match stream.try_read(buf) {
            Ok(0) if !buf.is_empty() => Err(LinkError::ConnectionClosed(Transport::Stream)),
            Ok(n) => {
                trace!("TCP read {} bytes", n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    /// Reads one datagram. Bytes beyond `buf` are discarded by the OS.
    pub fn read_datagram(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let socket = self
            .datagram
            .as_ref()
            .ok_or(LinkError::NotConnected(Transport::Datagram))?;

        match socket.try_recv_from(buf) {
            Ok((n, peer)) => {
                trace!("UDP read {} bytes from {}", n, peer);
                self.last_peer = Some(peer);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    pub async fn send_stream(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        use tokio::io::AsyncWriteExt;

        let stream = self
            .stream
            .as_mut()
            .ok_or(LinkError::NotConnected(Transport::Stream))?;
        stream.write_all(bytes).await?;
        Ok(())
    }

    /// Sends to the configured datagram remote.
    pub async fn send_datagram(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let socket = self
            .datagram
            .as_ref()
            .ok_or(LinkError::NotConnected(Transport::Datagram))?;
        let target = (self.config.datagram_addr.as_str(), self.config.datagram_port);
        Ok(socket.send_to(bytes, target).await?)
    }
}
