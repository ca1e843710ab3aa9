use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use aigw_common::ProviderId;

#[derive(Debug, Default)]
struct ProviderCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
    last_used_unix_ms: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub average_latency_ms: f64,
    pub last_used_unix_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub average_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub total_tokens_used: u64,
    pub estimated_cost: f64,
    pub per_provider: HashMap<ProviderId, ProviderStats>,
}

/// Aggregate counters plus a per-provider breakdown. All counters are
/// atomics so concurrent updates converge without a global lock; the
/// per-provider map is behind a `RwLock` since providers are a small, fixed
/// set established at startup and the map itself is never resized on the
/// hot path.
pub struct Stats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    total_latency_ms: AtomicU64,
    total_tokens_used: AtomicU64,
    estimated_cost_micros: AtomicU64,
    per_provider: RwLock<HashMap<ProviderId, ProviderCounters>>,
}

impl Stats {
    pub fn new(providers: impl IntoIterator<Item = ProviderId>) -> Self {
        let per_provider = providers
            .into_iter()
            .map(|p| (p, ProviderCounters::default()))
            .collect();
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            total_tokens_used: AtomicU64::new(0),
            estimated_cost_micros: AtomicU64::new(0),
            per_provider: RwLock::new(per_provider),
        }
    }

    pub fn record_cache_hit(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self, provider: ProviderId, latency_ms: u64, success: bool, now_unix_ms: i64) {
        let guard = self.per_provider.read();
        if let Some(counters) = guard.get(&provider) {
            counters.requests.fetch_add(1, Ordering::Relaxed);
            counters.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
            counters
                .last_used_unix_ms
                .store(now_unix_ms.max(0) as u64, Ordering::Relaxed);
            if success {
                counters.successes.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_request_outcome(&self, success: bool, total_latency_ms: u64, tokens: u64, cost: f64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(total_latency_ms, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_tokens_used.fetch_add(tokens, Ordering::Relaxed);
        self.estimated_cost_micros
            .fetch_add((cost * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache_hit_rate: f64) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful_requests = self.successful_requests.load(Ordering::Relaxed);
        let failed_requests = self.failed_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let executed = successful_requests + failed_requests;
        let average_response_time_ms = if executed == 0 {
            0.0
        } else {
            total_latency_ms as f64 / executed as f64
        };

        let per_provider = self
            .per_provider
            .read()
            .iter()
            .map(|(provider, counters)| {
                let requests = counters.requests.load(Ordering::Relaxed);
                let total_latency = counters.total_latency_ms.load(Ordering::Relaxed);
                let average_latency_ms = if requests == 0 {
                    0.0
                } else {
                    total_latency as f64 / requests as f64
                };
                (
                    *provider,
                    ProviderStats {
                        requests,
                        successes: counters.successes.load(Ordering::Relaxed),
                        failures: counters.failures.load(Ordering::Relaxed),
                        average_latency_ms,
                        last_used_unix_ms: counters.last_used_unix_ms.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            total_requests,
            successful_requests,
            failed_requests,
            cache_hits,
            average_response_time_ms,
            cache_hit_rate,
            total_tokens_used: self.total_tokens_used.load(Ordering::Relaxed),
            estimated_cost: self.estimated_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            per_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conserves_totals_across_outcomes() {
        let stats = Stats::new([ProviderId::Gemini, ProviderId::DeepSeek]);
        stats.record_cache_hit();
        stats.record_attempt(ProviderId::Gemini, 10, false, 0);
        stats.record_attempt(ProviderId::DeepSeek, 20, true, 0);
        stats.record_request_outcome(true, 30, 42, 0.001);

        let snapshot = stats.snapshot(0.5);
        assert_eq!(snapshot.total_requests, 2); // one cache hit + one executed
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(
            snapshot.per_provider[&ProviderId::Gemini].requests,
            snapshot.per_provider[&ProviderId::Gemini].successes
                + snapshot.per_provider[&ProviderId::Gemini].failures
        );
    }
}
