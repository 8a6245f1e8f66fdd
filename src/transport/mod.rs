//! Transport layer implementations for DNS proxy.
//!
//! Provides UDP and TCP listeners receiving DNS queries from clients and
//! handing them to the query pipeline.

pub mod tcp;
pub mod udp;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ResolveError;

pub use tcp::{TcpExchange, TcpTransport};
pub use udp::{UdpExchange, UdpTransport};

/// Maximum size of a DNS message. UDP buffers are sized for this so large
/// EDNS payloads are never cut short.
pub const MAX_DNS_PACKET_SIZE: usize = 65535;

/// One request/response round trip with an upstream server.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Send a wire-format query and wait up to `timeout` for the raw response.
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, ResolveError>;

    fn protocol(&self) -> Protocol;
}

/// Transport protocol identifier for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read one length-prefixed DNS message from a TCP stream.
///
/// TCP DNS messages start with a 2-byte big-endian length prefix. Returns
/// `None` when the peer closes the stream before a new message starts.
pub async fn read_frame<S>(stream: &mut S) -> io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = usize::from(u16::from_be_bytes(len_buf));
    let mut message = vec![0u8; len];
    stream.read_exact(&mut message).await?;
    Ok(Some(message))
}

/// Write one DNS message with its 2-byte length prefix.
pub async fn write_frame<S>(stream: &mut S, message: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message of {} bytes does not fit a TCP frame", message.len()),
        )
    })?;

    let mut frame = Vec::with_capacity(2 + message.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    stream.write_all(&frame).await?;
    stream.flush().await
}
