//! adsink - An ad-blocking DNS proxy.
//!
//! Queries for listed ad/tracking domains are answered with a sinkhole
//! address, allowed answers are cached by TTL, and everything else is
//! forwarded to a single upstream over UDP with TCP fallback.

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
