//! Error types shared across the proxy.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::error::ProtoError;
use thiserror::Error;

use crate::transport::Protocol;

/// Failure to forward a query to the upstream server.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to encode query: {0}")]
    Encode(#[source] ProtoError),

    #[error("{protocol} exchange with {server} timed out after {timeout:?}")]
    Timeout {
        protocol: Protocol,
        server: SocketAddr,
        timeout: Duration,
    },

    #[error("{protocol} exchange with {server} failed: {source}")]
    Io {
        protocol: Protocol,
        server: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("malformed {protocol} response: {source}")]
    Malformed {
        protocol: Protocol,
        #[source]
        source: ProtoError,
    },

    #[error("{protocol} response id {got} does not match query id {expected}")]
    IdMismatch {
        protocol: Protocol,
        expected: u16,
        got: u16,
    },

    #[error("message of {0} bytes exceeds the DNS maximum")]
    TooLarge(usize),
}

/// Invalid blocking rule.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid regex rule {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },
}

/// Fatal server errors. Any of these stops the proxy.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    Bind {
        protocol: Protocol,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve upstream {addr}: {reason}")]
    Upstream { addr: String, reason: String },

    #[error("{0} listener stopped unexpectedly")]
    ListenerStopped(Protocol),

    #[error("listener task failed: {0}")]
    ListenerTask(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
