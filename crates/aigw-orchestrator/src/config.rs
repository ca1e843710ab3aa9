use std::time::Duration;

use aigw_breaker::BreakerConfig;
use aigw_cache::CacheConfig;
use aigw_router::{CostPreference, LoadBalancingStrategy, ReliabilityLevel};

pub use crate::queue::QueueConfig;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Deterministic exponential backoff, `min(base * 2^attempt, max_delay)`,
    /// with a +/-10% scheduler jitter band around that value rather than a
    /// full jitter draw from zero, so the delay stays close to the scheduled
    /// exponential curve. Always clamped to `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped_ms = exp.min(self.max_delay).as_millis().max(1) as u64;
        let jitter_span = (capped_ms / 10).max(1);
        let low = capped_ms.saturating_sub(jitter_span);
        let high = capped_ms + jitter_span;
        let jittered_ms = rand::Rng::gen_range(&mut rand::thread_rng(), low..=high);
        Duration::from_millis(jittered_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Per-provider weights the orchestrator feeds into the router on every
/// selection call; distinct from `ProviderSettings`, which governs how to
/// talk to the provider rather than how to rank it.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub priority: i32,
    pub reliability: ReliabilityLevel,
    pub cost_tier: CostPreference,
}

impl Default for ProviderProfile {
    fn default() -> Self {
        Self {
            priority: 0,
            reliability: ReliabilityLevel::Medium,
            cost_tier: CostPreference::Medium,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cache: CacheConfig,
    pub breaker: BreakerConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    /// When set, candidate selection ignores scoring and uses this
    /// strategy instead. When `None`, the additive-scoring router path is
    /// used for every request.
    pub load_balancing_strategy: Option<LoadBalancingStrategy>,
    pub health_check_interval: Duration,
    pub stats_log_interval: Duration,
    pub shutdown_drain_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            breaker: BreakerConfig::default(),
            queue: QueueConfig::default(),
            retry: RetryConfig::default(),
            load_balancing_strategy: None,
            health_check_interval: Duration::from_secs(60),
            stats_log_interval: Duration::from_secs(30),
            shutdown_drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        for attempt in 0..10 {
            assert!(retry.backoff(attempt) <= Duration::from_millis(500));
        }
    }

    #[test]
    fn backoff_stays_close_to_the_deterministic_curve() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        };
        // attempt 2 -> deterministic 200 * 2^2 = 800ms, +/-10% = [720, 880]
        for _ in 0..50 {
            let delay = retry.backoff(2).as_millis();
            assert!((720..=880).contains(&delay), "delay {delay} outside expected band");
        }
    }
}
