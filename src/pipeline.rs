//! DNS query processing pipeline.
//!
//! Handles the decision for every query, shared by both transports:
//! 1. Filter (sinkhole ads/trackers)
//! 2. Cache lookup
//! 3. Forward to upstream and cache the answer
//!
//! Transports handle the actual I/O, the pipeline handles decisions.

use std::sync::Arc;
use std::time::Instant;

use hickory_proto::op::{Message, MessageType, OpCode};
use tracing::{debug, error, info, warn};

use crate::cache::{QueryKey, ResponseCache};
use crate::dns;
use crate::events::{Category, EventLog, QueryEvent};
use crate::filter::Blocker;
use crate::resolver::Upstream;
use crate::stats::Stats;
use crate::transport::{MAX_DNS_PACKET_SIZE, Protocol};

/// Answer produced for a query along with how it was obtained.
#[derive(Debug)]
pub struct Reply {
    pub message: Message,
    pub category: Category,
}

pub struct Pipeline {
    blocker: Arc<dyn Blocker>,
    cache: ResponseCache,
    upstream: Arc<dyn Upstream>,
    stats: Arc<Stats>,
    events: Arc<EventLog>,
}

impl Pipeline {
    pub fn new(
        blocker: Arc<dyn Blocker>,
        upstream: Arc<dyn Upstream>,
        stats: Arc<Stats>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            blocker,
            cache: ResponseCache::new(),
            upstream,
            stats,
            events,
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Process a raw query and return the wire-format reply.
    ///
    /// Returns `None` when nothing should be sent back: the packet does not
    /// decode, is not a standard query or carries no question.
    pub async fn handle_packet(&self, packet: &[u8], protocol: Protocol) -> Option<Vec<u8>> {
        let request = match Message::from_vec(packet) {
            Ok(request) => request,
            Err(e) => {
                debug!(%protocol, error = %e, "Dropping malformed query");
                return None;
            }
        };
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            debug!(
                %protocol,
                id = request.id(),
                op_code = ?request.op_code(),
                "Dropping non-query message"
            );
            return None;
        }

        let mut reply = self.handle(&request, protocol).await?;
        dns::align_edns(&mut reply.message, &request);

        let limit = match protocol {
            Protocol::Udp => dns::udp_payload_limit(&request),
            Protocol::Tcp => MAX_DNS_PACKET_SIZE,
        };
        match dns::encode(&reply.message, limit) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(%protocol, id = request.id(), error = %e, "Failed to encode reply");
                None
            }
        }
    }

    /// Decide how to answer `request`.
    ///
    /// Only the first question is considered. Exactly one outcome is
    /// recorded per answered query.
    pub async fn handle(&self, request: &Message, protocol: Protocol) -> Option<Reply> {
        let Some(query) = request.queries().first() else {
            debug!(%protocol, id = request.id(), "Dropping query without questions");
            return None;
        };

        let start = Instant::now();
        self.stats.record_query();

        let fqdn = query.name().to_ascii();
        let domain = fqdn.strip_suffix('.').unwrap_or(fqdn.as_str());

        // Step 1: Check blocklist
        if self.blocker.should_block(domain) {
            let reply = dns::sinkhole(request, query);
            return Some(self.finish(domain, protocol, start, Category::Blocked, reply));
        }

        // Step 2: Check cache
        let key = QueryKey::from_query(query);
        if let Some(mut cached) = self.cache.get(&key) {
            cached.set_id(request.id());
            return Some(self.finish(domain, protocol, start, Category::Cached, cached));
        }

        // Step 3: Forward to upstream
        match self.upstream.forward(request).await {
            Ok(mut response) => {
                self.cache.set(key, &response);
                response.set_id(request.id());
                Some(self.finish(domain, protocol, start, Category::Allowed, response))
            }
            Err(e) => {
                warn!(%protocol, domain, error = %e, "Upstream resolution failed");
                let reply = dns::server_failure(request);
                Some(self.finish(domain, protocol, start, Category::Error, reply))
            }
        }
    }

    fn finish(
        &self,
        domain: &str,
        protocol: Protocol,
        start: Instant,
        category: Category,
        message: Message,
    ) -> Reply {
        let elapsed = start.elapsed();
        self.stats.record_outcome(category, elapsed);
        info!(
            %protocol,
            domain,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "{}",
            category
        );
        self.events
            .publish(QueryEvent::new(category, domain, protocol, elapsed));

        Reply { message, category }
    }
}
