pub mod keys;

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;

const TTL_JITTER_RATIO: f64 = 0.1;

struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Bounded in-process cache with per-entry expiry. A zero TTL never expires.
/// Past capacity the least recently used entry is evicted, and every write
/// sweeps out entries whose TTL has run.
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, Slot<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => return None,
            Some(slot) if slot.is_live(now) => return Some(slot.value.clone()),
            Some(_) => {}
        }
        entries.pop(key);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(now + apply_ttl_jitter(ttl))
        };
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, now);
        entries.put(key.into(), Slot { value, expires_at });
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn purge_expired<V>(entries: &mut LruCache<String, Slot<V>>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, slot)| !slot.is_live(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}

fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    let jittered_ms = (base_ms * factor).round().max(1.0);
    Duration::from_millis(jittered_ms as u64)
}
