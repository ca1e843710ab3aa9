//! Process-wide facade: a single `Arc<Orchestrator>` built once from
//! `GatewayConfig` and stashed in a `OnceCell`, per the teacher's one-time
//! global-state idiom. `initialize` is idempotent -- a second call returns
//! the existing instance rather than rebuilding the orchestrator.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use aigw_common::{GatewayError, ProviderId};
use aigw_orchestrator::{Orchestrator, RoutingCriteria, StatsSnapshot};
use aigw_provider_core::{ChunkStream, ModelInfo, Provider, ProviderConfig, Request, Response};
use aigw_providers::{DeepSeekProvider, GeminiProvider, KimiProvider, MockProvider, QwenProvider};

use crate::config::GatewayConfig;

static FACADE: OnceCell<Arc<Orchestrator>> = OnceCell::new();

fn build_adapter(config: &ProviderConfig) -> Arc<dyn Provider> {
    match config {
        ProviderConfig::Gemini(settings) => Arc::new(GeminiProvider::new(settings.clone())),
        ProviderConfig::DeepSeek(settings) => Arc::new(DeepSeekProvider::new(settings.clone())),
        ProviderConfig::Qwen(settings) => Arc::new(QwenProvider::new(settings.clone())),
        ProviderConfig::Kimi(settings) => Arc::new(KimiProvider::new(settings.clone())),
        ProviderConfig::Mock(_) => Arc::new(MockProvider::new()),
    }
}

/// Builds an orchestrator from `config`, wiring one adapter per enabled
/// provider. Disabled providers are left out entirely rather than
/// constructed-and-ignored, so the router never has to special-case them.
pub fn build_orchestrator(config: &GatewayConfig) -> Arc<Orchestrator> {
    let providers = config
        .providers
        .iter()
        .filter(|p| p.settings().enabled)
        .map(|p| (build_adapter(p), GatewayConfig::profile_for(p.settings())))
        .collect();
    Orchestrator::new(providers, config.orchestrator.clone())
}

/// Idempotent: if the facade was already initialized, returns the existing
/// instance and ignores `config`.
pub async fn initialize(config: GatewayConfig) -> Result<Arc<Orchestrator>, GatewayError> {
    if let Some(existing) = FACADE.get() {
        return Ok(Arc::clone(existing));
    }
    let orchestrator = build_orchestrator(&config);
    orchestrator.initialize().await?;
    match FACADE.set(Arc::clone(&orchestrator)) {
        Ok(()) => Ok(orchestrator),
        // Lost a race with a concurrent initialize(); use whichever instance won.
        Err(_) => Ok(Arc::clone(FACADE.get().expect("just set"))),
    }
}

fn instance() -> Result<Arc<Orchestrator>, GatewayError> {
    FACADE
        .get()
        .cloned()
        .ok_or_else(|| GatewayError::invalid_request("gateway facade not initialized"))
}

pub async fn request(req: Request, criteria: Option<RoutingCriteria>) -> Result<Response, GatewayError> {
    let orchestrator = instance()?;
    let outcome = orchestrator.execute_request(req, criteria.unwrap_or_default()).await?;
    Ok(outcome.response)
}

pub async fn stream_request(req: Request, criteria: Option<RoutingCriteria>) -> Result<ChunkStream, GatewayError> {
    let orchestrator = instance()?;
    orchestrator.execute_stream_request(req, criteria.unwrap_or_default()).await
}

pub fn get_models() -> Result<Vec<ModelInfo>, GatewayError> {
    Ok(instance()?.get_models())
}

pub fn get_health_status() -> Result<std::collections::HashMap<ProviderId, bool>, GatewayError> {
    Ok(instance()?.get_health_status())
}

pub fn get_stats() -> Result<StatsSnapshot, GatewayError> {
    Ok(instance()?.get_stats())
}

pub fn reset_circuit_breaker(provider: ProviderId) -> Result<(), GatewayError> {
    instance()?.reset_circuit_breaker(provider)
}

pub fn clear_cache() -> Result<(), GatewayError> {
    instance()?.clear_cache();
    Ok(())
}

pub async fn shutdown() -> Result<(), GatewayError> {
    instance()?.shutdown().await;
    Ok(())
}
