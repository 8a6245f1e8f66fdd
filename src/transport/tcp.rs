//! TCP transport for DNS queries.
//!
//! Each client connection is handled independently. A connection may
//! carry several queries; they are answered in order until the client
//! closes the stream or stays idle too long. TCP DNS messages are
//! prefixed with a 2-byte length.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::{Exchange, MAX_DNS_PACKET_SIZE, Protocol, read_frame, write_frame};
use crate::error::{ResolveError, ServerError};
use crate::pipeline::Pipeline;

/// Connections idle for longer than this are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP listener for the DNS proxy.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                protocol: Protocol::Tcp,
                addr,
                source,
            })?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop - spawns a handler task for each incoming connection.
    /// Runs indefinitely.
    pub async fn serve(self, pipeline: Arc<Pipeline>) -> Result<(), ServerError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "TCP listener ready");
        }

        loop {
            match self.listener.accept().await {
                Ok((client, peer)) => {
                    tokio::spawn(handle_connection(client, peer, pipeline.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

/// Handle a single TCP connection: read queries and write the answers.
async fn handle_connection(mut client: TcpStream, peer: SocketAddr, pipeline: Arc<Pipeline>) {
    loop {
        let next = tokio::time::timeout(IDLE_TIMEOUT, read_frame(&mut client));
        let query = match next.await {
            Ok(Ok(Some(query))) => query,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                debug!(client = %peer, error = %e, "TCP read error");
                return;
            }
            Err(_) => {
                debug!(client = %peer, "TCP connection idle, closing");
                return;
            }
        };

        // Malformed queries get no answer; keep reading the stream.
        let Some(response) = pipeline.handle_packet(&query, Protocol::Tcp).await else {
            continue;
        };

        if let Err(e) = write_frame(&mut client, &response).await {
            debug!(client = %peer, error = %e, "TCP write error");
            return;
        }
    }
}

/// Upstream exchange over TCP, used when UDP fails or truncates.
pub struct TcpExchange {
    server: SocketAddr,
}

impl TcpExchange {
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Exchange for TcpExchange {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, ResolveError> {
        if query.len() > MAX_DNS_PACKET_SIZE {
            return Err(ResolveError::TooLarge(query.len()));
        }

        let round_trip = async {
            let mut stream = TcpStream::connect(self.server).await?;
            stream.set_nodelay(true)?;
            write_frame(&mut stream, query).await?;
            read_frame(&mut stream).await?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before response",
                )
            })
        };

        tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| ResolveError::Timeout {
                protocol: Protocol::Tcp,
                server: self.server,
                timeout,
            })?
            .map_err(|source| ResolveError::Io {
                protocol: Protocol::Tcp,
                server: self.server,
                source,
            })
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }
}
