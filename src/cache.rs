//! DNS response cache with TTL-based expiration.

use std::sync::RwLock;
use std::time::Duration;

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::RecordType;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

/// Cache key: lowercased FQDN (with trailing dot) and query type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    name: String,
    record_type: RecordType,
}

impl QueryKey {
    pub fn new(name: &str, record_type: RecordType) -> Self {
        let mut name = name.to_ascii_lowercase();
        if !name.ends_with('.') {
            name.push('.');
        }
        Self { name, record_type }
    }

    pub fn from_query(query: &Query) -> Self {
        Self::new(&query.name().to_ascii(), query.query_type())
    }
}

struct CacheEntry {
    response: Message,
    expires_at: Instant,
}

/// TTL-based DNS cache.
///
/// Entries expire lazily: a lookup past the expiry reports a miss and the
/// entry stays until the next successful resolution overwrites it.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<FxHashMap<QueryKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached response. Returns an independent copy.
    pub fn get(&self, key: &QueryKey) -> Option<Message> {
        let now = Instant::now();
        let Ok(entries) = self.entries.read() else {
            return None;
        };
        let entry = entries.get(key)?;
        if now < entry.expires_at {
            Some(entry.response.clone())
        } else {
            None
        }
    }

    /// Store a response, using the first answer's TTL.
    ///
    /// Responses without answers are not cached.
    pub fn set(&self, key: QueryKey, response: &Message) {
        let Some(first) = response.answers().first() else {
            return;
        };
        let ttl = Duration::from_secs(u64::from(first.ttl()));
        let entry = CacheEntry {
            response: response.clone(),
            expires_at: Instant::now() + ttl,
        };

        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        entries.insert(key, entry);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
