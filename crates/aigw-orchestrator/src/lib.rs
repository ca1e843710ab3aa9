//! End-to-end request pipeline: cache lookup, capability-aware provider
//! selection, circuit-breaker-guarded execution, retry with failover, and
//! the statistics/health bookkeeping the facade exposes to operators.

pub mod config;
pub mod queue;
mod stats;

pub use aigw_router::{CostPreference, LoadBalancingStrategy, PerformancePreference, ReliabilityLevel, RoutingCriteria};
pub use config::{OrchestratorConfig, ProviderProfile, RetryConfig};
pub use queue::QueueConfig;
pub use stats::{ProviderStats, StatsSnapshot};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use aigw_breaker::CircuitBreaker;
use aigw_cache::Cache;
use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{capability, ChunkStream, ModelInfo, Provider, Request, Response};
use aigw_router::{Candidate, Router};

use crate::queue::Queue;
use crate::stats::Stats;

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct ProviderEntry {
    adapter: Arc<dyn Provider>,
    breaker: CircuitBreaker,
    profile: ProviderProfile,
}

/// What `execute_request` actually did to produce a response: which
/// provider served it, how many upstream attempts that took, and whether it
/// came straight from cache.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub response: Response,
    pub provider: ProviderId,
    pub attempts: u32,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub providers_attempted: Vec<ProviderId>,
}

/// Owns every configured provider adapter, its circuit breaker, the shared
/// cache, and the statistics the facade surfaces over `/stats` and
/// `/healthz`. Cheap to clone via `Arc` and meant to be constructed once per
/// process.
pub struct Orchestrator {
    entries: HashMap<ProviderId, ProviderEntry>,
    order: Vec<ProviderId>,
    cache: Cache,
    router: Router,
    stats: Stats,
    queue: Queue,
    config: OrchestratorConfig,
    health: RwLock<HashMap<ProviderId, bool>>,
    shutting_down: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(providers: Vec<(Arc<dyn Provider>, ProviderProfile)>, config: OrchestratorConfig) -> Arc<Self> {
        let mut entries = HashMap::new();
        let mut order = Vec::new();
        let mut health = HashMap::new();
        for (adapter, profile) in providers {
            let id = adapter.id();
            order.push(id);
            health.insert(id, true);
            entries.insert(
                id,
                ProviderEntry {
                    breaker: CircuitBreaker::new(id, config.breaker.clone()),
                    adapter,
                    profile,
                },
            );
        }
        let stats = Stats::new(order.iter().copied());
        Arc::new(Self {
            cache: Cache::new(config.cache.clone()),
            queue: Queue::new(config.queue.clone()),
            router: Router::new(),
            stats,
            entries,
            order,
            health: RwLock::new(health),
            shutting_down: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Probes every provider once, then spawns the background health sweep
    /// and the periodic stats log. Call once after construction, before
    /// serving traffic.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), GatewayError> {
        for id in self.order.clone() {
            let ok = {
                let entry = &self.entries[&id];
                entry.adapter.initialize().await.is_ok() && entry.adapter.health_check().await
            };
            self.health.write().insert(id, ok);
            info!(event = "provider_initialized", provider = %id, healthy = ok, "provider initialized");
        }

        let health_task = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.health_check_loop().await })
        };
        let stats_task = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.stats_log_loop().await })
        };
        self.background.lock().extend([health_task, stats_task]);
        Ok(())
    }

    async fn health_check_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.health_check_interval);
        interval.tick().await; // first tick fires immediately; initialize() already probed once
        loop {
            interval.tick().await;
            if self.shutting_down.load(Ordering::Acquire) {
                return;
            }
            for id in self.order.clone() {
                let healthy = self.entries[&id].adapter.health_check().await;
                self.health.write().insert(id, healthy);
            }
        }
    }

    async fn stats_log_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.stats_log_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if self.shutting_down.load(Ordering::Acquire) {
                return;
            }
            let snapshot = self.get_stats();
            info!(
                event = "stats_snapshot",
                total_requests = snapshot.total_requests,
                cache_hit_rate = snapshot.cache_hit_rate,
                avg_response_ms = snapshot.average_response_time_ms,
                "periodic stats snapshot"
            );
        }
    }

    fn candidate_for(&self, provider_id: ProviderId, request: &Request) -> Candidate {
        let entry = &self.entries[&provider_id];
        let healthy = *self.health.read().get(&provider_id).unwrap_or(&false);
        let circuit_mode = entry.breaker.mode();
        let failure_count = entry.breaker.failure_count();

        let provider_stats = self.stats.snapshot(0.0);
        let average_latency_ms = provider_stats
            .per_provider
            .get(&provider_id)
            .filter(|p| p.requests > 0)
            .map(|p| p.average_latency_ms);

        let (model_capabilities, requested_model_known) = match &request.model {
            Some(model_id) => match capability::find_model(model_id) {
                Some(info) if info.provider == provider_id => (Some(info.capabilities), true),
                Some(_) => (None, true),
                None => (None, false),
            },
            None => (
                capability::default_model_for(provider_id).map(|m| m.capabilities),
                false,
            ),
        };

        Candidate {
            provider: provider_id,
            healthy,
            circuit_mode,
            failure_count,
            priority: entry.profile.priority,
            reliability: entry.profile.reliability,
            cost_tier: entry.profile.cost_tier,
            average_latency_ms,
            model_capabilities,
            requested_model_known,
        }
    }

    fn build_candidates(&self, request: &Request) -> Vec<Candidate> {
        self.order.iter().map(|id| self.candidate_for(*id, request)).collect()
    }

    fn pick(&self, candidates: &[Candidate], criteria: &RoutingCriteria) -> Option<ProviderId> {
        match self.config.load_balancing_strategy {
            Some(strategy) => self.router.select_for_strategy(candidates, criteria, strategy),
            None => self.router.select_provider(candidates, criteria).map(|s| s.provider),
        }
    }

    fn estimate_cost(response: &Response) -> f64 {
        capability::find_model(&response.model_id)
            .map(|m| m.capabilities.estimate_cost(response.usage.input_tokens, response.usage.output_tokens))
            .unwrap_or(0.0)
    }

    /// Runs the full pipeline for one non-streaming request: cache lookup,
    /// provider selection, circuit-breaker-guarded call, and retry/failover
    /// across providers on a retryable error until `retry.max_retries` is
    /// exhausted.
    pub async fn execute_request(&self, request: Request, criteria: RoutingCriteria) -> Result<ExecuteOutcome, GatewayError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(GatewayError::shutdown());
        }
        request.validate()?;

        if let Some(cached) = self.cache.get(&request) {
            self.stats.record_cache_hit();
            let provider = cached.provider;
            return Ok(ExecuteOutcome {
                response: cached,
                provider,
                attempts: 0,
                duration_ms: 0,
                cache_hit: true,
                providers_attempted: vec![],
            });
        }

        let _admission = self.queue.admit().await?;

        let mut criteria = criteria;
        if criteria.required_capabilities.is_none() {
            criteria.required_capabilities = Some(request.required_capabilities());
        }

        let started = tokio::time::Instant::now();
        let mut attempts: u32 = 0;
        let mut providers_attempted = Vec::new();
        let mut last_error: Option<GatewayError> = None;

        loop {
            let candidates = self.build_candidates(&request);
            let Some(provider_id) = self.pick(&candidates, &criteria) else {
                let total_ms = started.elapsed().as_millis() as u64;
                self.stats.record_request_outcome(false, total_ms, 0, 0.0);
                return Err(match last_error {
                    Some(err) => GatewayError::all_attempts_failed(err),
                    None => GatewayError::no_providers_available(),
                });
            };

            attempts += 1;
            providers_attempted.push(provider_id);
            let entry = &self.entries[&provider_id];
            let attempt_started = tokio::time::Instant::now();
            let result = entry.breaker.execute(|| entry.adapter.request(&request)).await;
            let latency_ms = attempt_started.elapsed().as_millis() as u64;
            let now_ms = now_unix_ms();

            match result {
                Ok(response) => {
                    self.stats.record_attempt(provider_id, latency_ms, true, now_ms);
                    let total_ms = started.elapsed().as_millis() as u64;
                    let cost = Self::estimate_cost(&response);
                    self.stats
                        .record_request_outcome(true, total_ms, response.usage.total_tokens as u64, cost);
                    self.cache.put(&request, response.clone());
                    return Ok(ExecuteOutcome {
                        response,
                        provider: provider_id,
                        attempts,
                        duration_ms: total_ms,
                        cache_hit: false,
                        providers_attempted,
                    });
                }
                Err(err) => {
                    self.stats.record_attempt(provider_id, latency_ms, false, now_ms);
                    let retryable = err.retryable();
                    let exhausted = attempts > self.config.retry.max_retries;
                    last_error = Some(err);
                    if !retryable || exhausted {
                        let total_ms = started.elapsed().as_millis() as u64;
                        self.stats.record_request_outcome(false, total_ms, 0, 0.0);
                        return Err(GatewayError::all_attempts_failed(last_error.unwrap()));
                    }
                    criteria.excluded_providers.push(provider_id);
                    tokio::time::sleep(self.config.retry.backoff(attempts - 1)).await;
                }
            }
        }
    }

    /// Runs the pipeline for a streaming request. Retries only cover
    /// failures before the stream is established (connection refused, auth
    /// failure, circuit open); once a `ChunkStream` is handed back to the
    /// caller, a mid-stream error surfaces as the stream's own terminal item
    /// rather than triggering a fresh attempt. Capped at
    /// `min(retry.max_retries, 2)` attempts since a caller mid-render of a
    /// partial answer should not wait through a full retry budget before
    /// getting a first byte.
    pub async fn execute_stream_request(&self, request: Request, criteria: RoutingCriteria) -> Result<ChunkStream, GatewayError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(GatewayError::shutdown());
        }
        request.validate()?;

        let _admission = self.queue.admit().await?;

        let mut criteria = criteria;
        if criteria.required_capabilities.is_none() {
            let mut required = request.required_capabilities();
            required.streaming = true;
            criteria.required_capabilities = Some(required);
        }

        let max_attempts = self.config.retry.max_retries.min(2) + 1;
        let mut last_error: Option<GatewayError> = None;

        for attempt in 0..max_attempts {
            let candidates = self.build_candidates(&request);
            let Some(provider_id) = self.pick(&candidates, &criteria) else {
                return Err(match last_error {
                    Some(err) => GatewayError::all_attempts_failed(err),
                    None => GatewayError::no_providers_available(),
                });
            };

            let entry = &self.entries[&provider_id];
            let attempt_started = tokio::time::Instant::now();
            let result = entry.breaker.execute(|| entry.adapter.stream_request(&request)).await;
            let latency_ms = attempt_started.elapsed().as_millis() as u64;
            let now_ms = now_unix_ms();

            match result {
                Ok(stream) => {
                    self.stats.record_attempt(provider_id, latency_ms, true, now_ms);
                    return Ok(stream);
                }
                Err(err) => {
                    self.stats.record_attempt(provider_id, latency_ms, false, now_ms);
                    let retryable = err.retryable();
                    last_error = Some(err);
                    if !retryable || attempt + 1 >= max_attempts {
                        break;
                    }
                    criteria.excluded_providers.push(provider_id);
                    tokio::time::sleep(self.config.retry.backoff(attempt)).await;
                }
            }
        }

        Err(GatewayError::all_attempts_failed(
            last_error.unwrap_or_else(GatewayError::no_providers_available),
        ))
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.cache.hit_rate())
    }

    pub fn get_health_status(&self) -> HashMap<ProviderId, bool> {
        self.health.read().clone()
    }

    pub fn get_models(&self) -> Vec<ModelInfo> {
        self.order
            .iter()
            .flat_map(|id| capability::models_for_provider(*id))
            .copied()
            .collect()
    }

    pub fn reset_circuit_breaker(&self, provider: ProviderId) -> Result<(), GatewayError> {
        match self.entries.get(&provider) {
            Some(entry) => {
                entry.breaker.reset();
                Ok(())
            }
            None => Err(GatewayError::invalid_request(format!("unknown provider {provider}"))),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stops admitting new work immediately and waits up to
    /// `shutdown_drain_timeout` for in-flight requests to finish before
    /// aborting the background tasks.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let deadline = tokio::time::Instant::now() + self.config.shutdown_drain_timeout;
        while self.queue.active_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigw_providers::{MockProvider, MockResponse};

    fn orchestrator(providers: Vec<(Arc<dyn Provider>, ProviderProfile)>, config: OrchestratorConfig) -> Arc<Orchestrator> {
        Orchestrator::new(providers, config)
    }

    fn mock_entry(profile: ProviderProfile) -> (Arc<dyn Provider>, ProviderProfile) {
        (Arc::new(MockProvider::new()) as Arc<dyn Provider>, profile)
    }

    fn request(stream: bool) -> Request {
        Request {
            messages: vec![aigw_provider_core::ChatMessage::user("hi")],
            model: Some("mock-model".to_string()),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream,
            functions: vec![],
            system_prompt: None,
        }
    }

    /// No model named, so every provider's own default model applies --
    /// needed when candidates span more than one `ProviderId`, since naming
    /// a model tied to one provider would exclude every other candidate.
    fn request_any_model(stream: bool) -> Request {
        Request {
            messages: vec![aigw_provider_core::ChatMessage::user("hi")],
            model: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream,
            functions: vec![],
            system_prompt: None,
        }
    }

    // S1: a healthy mock provider serves a request on the first attempt and
    // the response is cached for an identical follow-up call.
    #[tokio::test]
    async fn s1_success_path_then_cache_hit() {
        let orch = orchestrator(vec![mock_entry(ProviderProfile::default())], OrchestratorConfig::default());
        let first = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap();
        assert_eq!(first.attempts, 1);
        assert!(!first.cache_hit);

        let second = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.response.content, first.response.content);
    }

    // S2: the first provider fails with a retryable error, the orchestrator
    // fails over to the second one and still returns success.
    #[tokio::test]
    async fn s2_retryable_failure_triggers_failover() {
        let flaky = Arc::new(MockProvider::with_id(ProviderId::Gemini));
        flaky.push_response(MockResponse::Error(GatewayError::Network {
            provider: ProviderId::Gemini,
            message: "boom".to_string(),
        }));
        let stable = Arc::new(MockProvider::with_id(ProviderId::DeepSeek));
        stable.push_response(MockResponse::text("stable"));

        let orch = orchestrator(
            vec![
                (flaky as Arc<dyn Provider>, ProviderProfile { priority: 5, ..Default::default() }),
                (stable as Arc<dyn Provider>, ProviderProfile { priority: 1, ..Default::default() }),
            ],
            OrchestratorConfig::default(),
        );

        let outcome = orch.execute_request(request_any_model(false), RoutingCriteria::default()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.providers_attempted.len(), 2);
        assert_eq!(outcome.response.content, "stable");
    }

    // S3: a non-retryable error (authentication) fails the whole request
    // immediately without trying other providers.
    #[tokio::test]
    async fn s3_non_retryable_error_skips_failover() {
        let broken = Arc::new(MockProvider::with_id(ProviderId::Gemini));
        broken.push_response(MockResponse::Error(GatewayError::Authentication {
            provider: ProviderId::Gemini,
        }));
        let other = Arc::new(MockProvider::with_id(ProviderId::DeepSeek));
        other.push_response(MockResponse::text("other"));

        let orch = orchestrator(
            vec![
                (broken as Arc<dyn Provider>, ProviderProfile { priority: 5, ..Default::default() }),
                (other as Arc<dyn Provider>, ProviderProfile { priority: 1, ..Default::default() }),
            ],
            OrchestratorConfig::default(),
        );

        let err = orch
            .execute_request(request_any_model(false), RoutingCriteria::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALL_ATTEMPTS_FAILED");
    }

    // S4: once a provider's circuit is open, selection excludes it entirely
    // rather than retrying a provider known to be down.
    #[tokio::test]
    async fn s4_open_circuit_excludes_provider() {
        let flaky = Arc::new(MockProvider::new());
        for _ in 0..5 {
            flaky.push_response(MockResponse::Error(GatewayError::Network {
                provider: ProviderId::Mock,
                message: "down".to_string(),
            }));
        }
        let orch = orchestrator(
            vec![(flaky as Arc<dyn Provider>, ProviderProfile::default())],
            OrchestratorConfig {
                retry: RetryConfig {
                    max_retries: 0,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
                ..Default::default()
            },
        );
        for _ in 0..5 {
            let _ = orch.execute_request(request(false), RoutingCriteria::default()).await;
        }
        assert_eq!(orch.entries[&ProviderId::Mock].breaker.mode(), aigw_breaker::CircuitMode::Open);

        let err = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap_err();
        assert_eq!(err.code(), "NO_PROVIDERS_AVAILABLE");
    }

    // S5: exhausting the retry budget across every available provider
    // surfaces ALL_ATTEMPTS_FAILED rather than looping forever.
    #[tokio::test]
    async fn s5_exhausts_retry_budget() {
        let a = Arc::new(MockProvider::new());
        a.push_response(MockResponse::Error(GatewayError::Network {
            provider: ProviderId::Gemini,
            message: "down".to_string(),
        }));
        let orch = orchestrator(
            vec![(a as Arc<dyn Provider>, ProviderProfile::default())],
            OrchestratorConfig {
                retry: RetryConfig {
                    max_retries: 1,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
                ..Default::default()
            },
        );
        let err = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap_err();
        assert_eq!(err.code(), "ALL_ATTEMPTS_FAILED");
    }

    // S6: a streaming request whose first provider fails before any chunk is
    // produced fails over to the next provider within the capped streaming
    // retry budget, rather than surfacing the error to the caller.
    #[tokio::test]
    async fn s6_streaming_pre_first_chunk_failover() {
        let flaky = Arc::new(MockProvider::with_id(ProviderId::Gemini));
        flaky.push_response(MockResponse::Error(GatewayError::Network {
            provider: ProviderId::Gemini,
            message: "cold start".to_string(),
        }));
        let warm = Arc::new(MockProvider::with_id(ProviderId::DeepSeek));
        warm.push_response(MockResponse::stream_text(["a", "b"]));

        let orch = orchestrator(
            vec![
                (flaky as Arc<dyn Provider>, ProviderProfile { priority: 5, ..Default::default() }),
                (warm as Arc<dyn Provider>, ProviderProfile { priority: 1, ..Default::default() }),
            ],
            OrchestratorConfig::default(),
        );
        let stream = orch
            .execute_stream_request(request_any_model(true), RoutingCriteria::default())
            .await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_touching_providers() {
        let orch = orchestrator(vec![mock_entry(ProviderProfile::default())], OrchestratorConfig::default());
        let mut bad = request(false);
        bad.messages.clear();
        let err = orch.execute_request(bad, RoutingCriteria::default()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn reset_circuit_breaker_rejects_unknown_provider() {
        let orch = orchestrator(vec![mock_entry(ProviderProfile::default())], OrchestratorConfig::default());
        assert!(orch.reset_circuit_breaker(ProviderId::Kimi).is_err());
        assert!(orch.reset_circuit_breaker(ProviderId::Mock).is_ok());
    }

    #[tokio::test]
    async fn clear_cache_forces_a_fresh_lookup() {
        let orch = orchestrator(vec![mock_entry(ProviderProfile::default())], OrchestratorConfig::default());
        let _ = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap();
        orch.clear_cache();
        let second = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap();
        assert!(!second.cache_hit);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_requests() {
        let orch = orchestrator(vec![mock_entry(ProviderProfile::default())], OrchestratorConfig::default());
        orch.shutdown().await;
        let err = orch.execute_request(request(false), RoutingCriteria::default()).await.unwrap_err();
        assert_eq!(err.code(), "SHUTDOWN");
    }
}
