//! UDP transport for DNS queries.
//!
//! The listener receives connectionless queries and answers each one from
//! its own task. [`UdpExchange`] is the client side used for the fast
//! upstream attempt.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::{Exchange, MAX_DNS_PACKET_SIZE, Protocol};
use crate::error::{ResolveError, ServerError};
use crate::pipeline::Pipeline;

/// Kernel receive buffer requested for the listening socket.
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// Pause after a failed receive before polling the socket again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// UDP listener for the DNS proxy.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let socket = bind_socket(addr).map_err(|source| ServerError::Bind {
            protocol: Protocol::Udp,
            addr,
            source,
        })?;

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop. Every packet is handled in a separate task so a slow
    /// upstream never holds up other clients. Runs indefinitely.
    pub async fn serve(self, pipeline: Arc<Pipeline>) -> Result<(), ServerError> {
        if let Ok(addr) = self.socket.local_addr() {
            info!(%addr, "UDP listener ready");
        }
        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

        loop {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "UDP recv error");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let packet = buf[..len].to_vec();
            let socket = self.socket.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let Some(response) = pipeline.handle_packet(&packet, Protocol::Udp).await else {
                    return;
                };
                if let Err(e) = socket.send_to(&response, src).await {
                    debug!(client = %src, error = %e, "UDP response error");
                }
            });
        }
    }
}

fn bind_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(
        Domain::for_address(addr),
        Type::DGRAM,
        Some(SockProtocol::UDP),
    )?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!(error = %e, "Could not enlarge UDP receive buffer");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Upstream exchange over UDP.
///
/// Uses a fresh ephemeral socket per query, connected to the server so
/// datagrams from other sources are discarded by the kernel.
pub struct UdpExchange {
    server: SocketAddr,
}

impl UdpExchange {
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Exchange for UdpExchange {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, ResolveError> {
        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let round_trip = async {
            let socket = UdpSocket::bind(bind_addr).await?;
            socket.connect(self.server).await?;
            socket.send(query).await?;

            let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
            let len = socket.recv(&mut buf).await?;
            buf.truncate(len);
            Ok::<_, io::Error>(buf)
        };

        tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| ResolveError::Timeout {
                protocol: Protocol::Udp,
                server: self.server,
                timeout,
            })?
            .map_err(|source| ResolveError::Io {
                protocol: Protocol::Udp,
                server: self.server,
                source,
            })
    }

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }
}
