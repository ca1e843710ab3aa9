//! In-memory, TTL'd response cache, keyed by a stable fingerprint of a
//! request's identity tuple. Streaming requests and failed requests never
//! touch this cache; callers are expected to check `request.stream` before
//! calling `get`/`put`.

mod fingerprint;

pub use fingerprint::Fingerprint;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use aigw_provider_core::{Request, Response};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

struct Entry {
    response: Response,
    expires_at: Instant,
}

struct Inner {
    map: HashMap<Fingerprint, Entry>,
    order: VecDeque<Fingerprint>,
}

/// Bounded, TTL'd response cache. Eviction removes the oldest-inserted entry
/// once `max_size` is reached; expiry is checked lazily on `get`.
pub struct Cache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, request: &Request) -> Option<Response> {
        if !self.config.enabled || request.stream {
            return None;
        }
        let key = fingerprint::fingerprint(request);
        let mut inner = self.inner.lock();
        match inner.map.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let response = entry.response.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            Some(_) => {
                inner.map.remove(&key);
                inner.order.retain(|k| k != &key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, request: &Request, response: Response) {
        if !self.config.enabled || request.stream {
            return;
        }
        let key = fingerprint::fingerprint(request);
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&key) && inner.map.len() >= self.config.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        let expires_at = Instant::now() + self.config.ttl;
        if inner.map.insert(key, Entry { response, expires_at }).is_none() {
            inner.order.push_back(key);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `hits / (hits + misses)` since construction or the last `clear()`.
    /// Zero when no lookups have happened yet.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
