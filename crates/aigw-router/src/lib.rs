//! Provider selection: capability filtering plus additive scoring for
//! `select_provider`, and a separate, unscored `select_for_strategy` path
//! used for simple load-balancing strategies.

use std::sync::atomic::{AtomicUsize, Ordering};

use aigw_breaker::CircuitMode;
use aigw_common::ProviderId;
use aigw_provider_core::RequiredCapabilities;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostPreference {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilityLevel {
    High,
    Medium,
    Low,
}

impl ReliabilityLevel {
    fn multiplier(self) -> f64 {
        match self {
            ReliabilityLevel::High => 1.0,
            ReliabilityLevel::Medium => 0.7,
            ReliabilityLevel::Low => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformancePreference {
    Speed,
    Quality,
    Balanced,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingCriteria {
    pub required_capabilities: Option<RequiredCapabilities>,
    pub cost_preference: Option<CostPreference>,
    pub reliability_level: Option<ReliabilityLevel>,
    pub performance: Option<PerformancePreference>,
    pub preferred_provider: Option<ProviderId>,
    pub excluded_providers: Vec<ProviderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    Priority,
    RoundRobin,
    Random,
    LeastLatency,
}

/// Everything the router needs to know about one provider at selection
/// time, assembled fresh by the orchestrator on every call from its own
/// adapters, circuit breakers, and stats -- the router itself holds no
/// provider state beyond the round-robin cursor.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: ProviderId,
    pub healthy: bool,
    pub circuit_mode: CircuitMode,
    pub failure_count: u32,
    pub priority: i32,
    pub reliability: ReliabilityLevel,
    pub cost_tier: CostPreference,
    pub average_latency_ms: Option<f64>,
    /// Capabilities of the model this request would run against on this
    /// provider, if that model is known to it; `None` if the request named
    /// no model (provider default applies) or the model id is unrecognized.
    pub model_capabilities: Option<aigw_provider_core::ModelCapability>,
    pub requested_model_known: bool,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: ProviderId,
    pub confidence: f64,
    pub reason: String,
    pub fallbacks: Vec<ProviderId>,
}

fn available(candidate: &Candidate, criteria: &RoutingCriteria) -> bool {
    candidate.healthy
        && candidate.circuit_mode != CircuitMode::Open
        && !criteria.excluded_providers.contains(&candidate.provider)
}

fn capability_ok(candidate: &Candidate, required: &RequiredCapabilities) -> bool {
    match &candidate.model_capabilities {
        Some(caps) => caps.satisfies(required),
        None => !candidate.requested_model_known,
    }
}

fn score(candidate: &Candidate, criteria: &RoutingCriteria) -> i64 {
    let mut score: i64 = 30;
    score += (25.0 * candidate.reliability.multiplier()).round() as i64;

    if let Some(pref) = criteria.cost_preference {
        if pref == candidate.cost_tier {
            score += match pref {
                CostPreference::Low => 20,
                CostPreference::Medium => 15,
                CostPreference::High => 10,
            };
        }
    }

    if let Some(required) = &criteria.required_capabilities {
        if required.streaming {
            score += bonus_if(candidate, |c| c.supports_streaming, 3);
        }
        if required.function_calling {
            score += bonus_if(candidate, |c| c.supports_function_calling, 5);
        }
        if required.images {
            score += bonus_if(candidate, |c| c.supports_images, 4);
        }
        if required.documents {
            score += bonus_if(candidate, |c| c.supports_documents, 3);
        }
    }

    match (&candidate.model_capabilities, candidate.requested_model_known) {
        (Some(_), _) => score += 10,
        (None, false) => score += 5,
        (None, true) => score -= 2,
    }

    if criteria.preferred_provider == Some(candidate.provider) {
        score += 15;
    }

    score -= (2 * candidate.failure_count).min(10) as i64;

    score.max(0)
}

fn bonus_if(
    candidate: &Candidate,
    predicate: impl Fn(&aigw_provider_core::ModelCapability) -> bool,
    bonus: i64,
) -> i64 {
    match &candidate.model_capabilities {
        Some(caps) if predicate(caps) => bonus,
        _ => 0,
    }
}

pub struct Router {
    round_robin_cursor: AtomicUsize,
}

impl Router {
    pub fn new() -> Self {
        Self {
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    /// Filters by availability and capability, scores survivors, and
    /// returns the winner plus up to three fallbacks in descending score
    /// order. Ties break by descending `priority`, then input order.
    pub fn select_provider(
        &self,
        candidates: &[Candidate],
        criteria: &RoutingCriteria,
    ) -> Option<Selection> {
        let required = criteria.required_capabilities.clone().unwrap_or_default();

        let mut scored: Vec<(i64, &Candidate)> = candidates
            .iter()
            .filter(|c| available(c, criteria))
            .filter(|c| capability_ok(c, &required))
            .map(|c| (score(c, criteria), c))
            .collect();

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.priority.cmp(&a.1.priority))
        });

        let (winner_score, winner) = scored.first().copied()?;
        let fallbacks = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|(_, c)| c.provider)
            .collect();

        Some(Selection {
            provider: winner.provider,
            confidence: (winner_score as f64 / 100.0).min(1.0),
            reason: format!("score={winner_score}"),
            fallbacks,
        })
    }

    /// Strategy-based selection without scoring, for callers that want
    /// straightforward priority/round-robin/random/least-latency behavior
    /// instead of capability-weighted scoring.
    pub fn select_for_strategy(
        &self,
        candidates: &[Candidate],
        criteria: &RoutingCriteria,
        strategy: LoadBalancingStrategy,
    ) -> Option<ProviderId> {
        let healthy: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| available(c, criteria))
            .collect();
        if healthy.is_empty() {
            return None;
        }

        match strategy {
            LoadBalancingStrategy::Priority => {
                healthy.iter().max_by_key(|c| c.priority).map(|c| c.provider)
            }
            LoadBalancingStrategy::RoundRobin => {
                let idx = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
                Some(healthy[idx].provider)
            }
            LoadBalancingStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..healthy.len());
                Some(healthy[idx].provider)
            }
            LoadBalancingStrategy::LeastLatency => healthy
                .iter()
                .filter(|c| c.average_latency_ms.is_some())
                .min_by(|a, b| {
                    a.average_latency_ms
                        .unwrap()
                        .partial_cmp(&b.average_latency_ms.unwrap())
                        .unwrap()
                })
                .or_else(|| healthy.iter().max_by_key(|c| c.priority))
                .map(|c| c.provider),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigw_provider_core::ModelCapability;

    fn caps() -> ModelCapability {
        ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 4096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
        }
    }

    fn candidate(provider: ProviderId, priority: i32) -> Candidate {
        Candidate {
            provider,
            healthy: true,
            circuit_mode: CircuitMode::Closed,
            failure_count: 0,
            priority,
            reliability: ReliabilityLevel::High,
            cost_tier: CostPreference::Medium,
            average_latency_ms: None,
            model_capabilities: Some(caps()),
            requested_model_known: true,
        }
    }

    #[test]
    fn excludes_unhealthy_and_open_circuits() {
        let router = Router::new();
        let mut down = candidate(ProviderId::Gemini, 5);
        down.healthy = false;
        let up = candidate(ProviderId::DeepSeek, 1);
        let selection = router
            .select_provider(&[down, up], &RoutingCriteria::default())
            .unwrap();
        assert_eq!(selection.provider, ProviderId::DeepSeek);
    }

    #[test]
    fn excludes_open_circuit() {
        let router = Router::new();
        let mut open = candidate(ProviderId::Gemini, 5);
        open.circuit_mode = CircuitMode::Open;
        let closed = candidate(ProviderId::DeepSeek, 1);
        let selection = router
            .select_provider(&[open, closed], &RoutingCriteria::default())
            .unwrap();
        assert_eq!(selection.provider, ProviderId::DeepSeek);
    }

    #[test]
    fn preferred_provider_wins_ties() {
        let router = Router::new();
        let a = candidate(ProviderId::Gemini, 1);
        let b = candidate(ProviderId::DeepSeek, 1);
        let criteria = RoutingCriteria {
            preferred_provider: Some(ProviderId::DeepSeek),
            ..Default::default()
        };
        let selection = router.select_provider(&[a, b], &criteria).unwrap();
        assert_eq!(selection.provider, ProviderId::DeepSeek);
    }

    #[test]
    fn failure_count_penalizes_score() {
        let router = Router::new();
        let mut flaky = candidate(ProviderId::Gemini, 5);
        flaky.failure_count = 10;
        let stable = candidate(ProviderId::DeepSeek, 1);
        let selection = router
            .select_provider(&[flaky, stable], &RoutingCriteria::default())
            .unwrap();
        assert_eq!(selection.provider, ProviderId::DeepSeek);
    }

    #[test]
    fn returns_none_when_nothing_available() {
        let router = Router::new();
        let mut only = candidate(ProviderId::Gemini, 1);
        only.healthy = false;
        assert!(router
            .select_provider(&[only], &RoutingCriteria::default())
            .is_none());
    }

    #[test]
    fn round_robin_cycles_through_healthy_providers() {
        let router = Router::new();
        let candidates = vec![
            candidate(ProviderId::Gemini, 1),
            candidate(ProviderId::DeepSeek, 1),
        ];
        let first = router
            .select_for_strategy(&candidates, &RoutingCriteria::default(), LoadBalancingStrategy::RoundRobin)
            .unwrap();
        let second = router
            .select_for_strategy(&candidates, &RoutingCriteria::default(), LoadBalancingStrategy::RoundRobin)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn fallbacks_exclude_the_winner_and_cap_at_three() {
        let router = Router::new();
        let candidates = vec![
            candidate(ProviderId::Gemini, 4),
            candidate(ProviderId::DeepSeek, 3),
            candidate(ProviderId::Qwen, 2),
            candidate(ProviderId::Kimi, 1),
        ];
        let selection = router
            .select_provider(&candidates, &RoutingCriteria::default())
            .unwrap();
        assert!(!selection.fallbacks.contains(&selection.provider));
        assert!(selection.fallbacks.len() <= 3);
    }
}
