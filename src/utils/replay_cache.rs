//! Replay cache for handshake hellos.
//!
//! Timestamp freshness alone lets an attacker replay a captured ClientHello
//! within the freshness window. The cache remembers every `(peer, nonce)`
//! pair it has seen for a TTL longer than that window, so each hello is
//! accepted at most once. Capacity is bounded with FIFO eviction.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Key for cache entries - combines peer identifier with nonce
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    peer_id: String,
    nonce: [u8; 16],
}

#[derive(Debug)]
pub struct ReplayCache {
    seen: HashMap<CacheKey, (Instant, u64)>,
    order: VecDeque<CacheKey>,
    ttl: Duration,
    max_entries: usize,
}

impl ReplayCache {
    /// Default TTL: 5 minutes (ten times the hello freshness window)
    /// Default max entries: 10,000
    pub fn new() -> Self {
        Self::with_settings(Duration::from_secs(300), 10_000)
    }

    pub fn with_settings(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Record a hello and report whether it was already seen.
    ///
    /// A repeated nonce from the same peer is a replay whatever its timestamp.
    pub fn is_replay(&mut self, peer_id: &str, nonce: &[u8; 16], timestamp: u64) -> bool {
        self.evict_expired();

        let key = CacheKey {
            peer_id: peer_id.to_string(),
            nonce: *nonce,
        };

        if let Some((_, first_timestamp)) = self.seen.get(&key) {
            warn!(
                peer_id,
                first_timestamp,
                timestamp,
                "Replay detected - handshake nonce already used"
            );
            return true;
        }

        while self.seen.len() >= self.max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.seen.remove(&oldest);
                }
                None => break,
            }
        }

        self.seen.insert(key.clone(), (Instant::now(), timestamp));
        self.order.push_back(key);
        false
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        let mut removed = 0usize;
        while let Some(front) = self.order.front() {
            match self.seen.get(front) {
                Some((added, _)) if now.duration_since(*added) < self.ttl => break,
                _ => {
                    if let Some(key) = self.order.pop_front() {
                        self.seen.remove(&key);
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            debug!(removed, "Evicted expired replay cache entries");
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}
