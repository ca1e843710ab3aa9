use serde::Serialize;

use aigw_common::{GatewayError, ProviderId};

use crate::config::ProviderSettings;
use crate::request::{estimate_tokens, Request};

/// Capabilities a single request may need; compared against a model's
/// `ModelCapability` during validation and against a `RoutingCriteria` during
/// scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredCapabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub images: bool,
    pub documents: bool,
    pub min_context_tokens: u32,
}

/// Static capability and pricing table entry for one known model id.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelCapability {
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub supports_streaming: bool,
    pub supports_function_calling: bool,
    pub supports_images: bool,
    pub supports_documents: bool,
    /// USD per input token, estimated from published per-million-token rates.
    pub cost_per_input_token: f64,
    /// USD per output token, estimated from published per-million-token rates.
    pub cost_per_output_token: f64,
}

impl ModelCapability {
    pub fn satisfies(&self, required: &RequiredCapabilities) -> bool {
        (!required.streaming || self.supports_streaming)
            && (!required.function_calling || self.supports_function_calling)
            && (!required.images || self.supports_images)
            && (!required.documents || self.supports_documents)
            && required.min_context_tokens <= self.max_context_tokens
    }

    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        input_tokens as f64 * self.cost_per_input_token
            + output_tokens as f64 * self.cost_per_output_token
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub provider: ProviderId,
    pub capabilities: ModelCapability,
}

static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        provider: ProviderId::Gemini,
        capabilities: ModelCapability {
            max_context_tokens: 2_000_000,
            max_output_tokens: 8_192,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: true,
            supports_documents: true,
            cost_per_input_token: 3.5 / 1_000_000.0,
            cost_per_output_token: 10.5 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "gemini-1.5-flash",
        display_name: "Gemini 1.5 Flash",
        provider: ProviderId::Gemini,
        capabilities: ModelCapability {
            max_context_tokens: 1_000_000,
            max_output_tokens: 8_192,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: true,
            supports_documents: true,
            cost_per_input_token: 0.35 / 1_000_000.0,
            cost_per_output_token: 1.05 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "gemini-1.0-pro",
        display_name: "Gemini 1.0 Pro",
        provider: ProviderId::Gemini,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 4_096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.5 / 1_000_000.0,
            cost_per_output_token: 1.5 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "deepseek-chat",
        display_name: "DeepSeek Chat",
        provider: ProviderId::DeepSeek,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 4_096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.14 / 1_000_000.0,
            cost_per_output_token: 0.28 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "deepseek-coder",
        display_name: "DeepSeek Coder",
        provider: ProviderId::DeepSeek,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 4_096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.14 / 1_000_000.0,
            cost_per_output_token: 0.28 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "qwen-max",
        display_name: "Qwen Max",
        provider: ProviderId::Qwen,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 2_048,
            supports_streaming: true,
            // Advertised for scoring purposes; the Qwen adapter does not yet
            // translate function-call or image payloads. See DESIGN.md.
            supports_function_calling: true,
            supports_images: true,
            supports_documents: false,
            cost_per_input_token: 2.0 / 1_000_000.0,
            cost_per_output_token: 6.0 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "qwen-plus",
        display_name: "Qwen Plus",
        provider: ProviderId::Qwen,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 2_048,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.4 / 1_000_000.0,
            cost_per_output_token: 1.2 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "qwen-turbo",
        display_name: "Qwen Turbo",
        provider: ProviderId::Qwen,
        capabilities: ModelCapability {
            max_context_tokens: 8_000,
            max_output_tokens: 1_500,
            supports_streaming: true,
            supports_function_calling: false,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 0.05 / 1_000_000.0,
            cost_per_output_token: 0.2 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "moonshot-v1-8k",
        display_name: "Moonshot v1 8K",
        provider: ProviderId::Kimi,
        capabilities: ModelCapability {
            max_context_tokens: 8_000,
            max_output_tokens: 2_048,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 1.2 / 1_000_000.0,
            cost_per_output_token: 1.2 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "moonshot-v1-32k",
        display_name: "Moonshot v1 32K",
        provider: ProviderId::Kimi,
        capabilities: ModelCapability {
            max_context_tokens: 32_000,
            max_output_tokens: 4_096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 2.4 / 1_000_000.0,
            cost_per_output_token: 2.4 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "moonshot-v1-128k",
        display_name: "Moonshot v1 128K",
        provider: ProviderId::Kimi,
        capabilities: ModelCapability {
            max_context_tokens: 128_000,
            max_output_tokens: 4_096,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: false,
            supports_documents: false,
            cost_per_input_token: 6.0 / 1_000_000.0,
            cost_per_output_token: 6.0 / 1_000_000.0,
        },
    },
    ModelInfo {
        id: "mock-model",
        display_name: "Mock Model",
        provider: ProviderId::Mock,
        capabilities: ModelCapability {
            max_context_tokens: 1_000_000,
            max_output_tokens: 8_192,
            supports_streaming: true,
            supports_function_calling: true,
            supports_images: true,
            supports_documents: true,
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
        },
    },
];

pub fn all_models() -> &'static [ModelInfo] {
    MODELS
}

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn models_for_provider(provider: ProviderId) -> impl Iterator<Item = &'static ModelInfo> {
    MODELS.iter().filter(move |m| m.provider == provider)
}

pub fn default_model_for(provider: ProviderId) -> Option<&'static ModelInfo> {
    models_for_provider(provider).next()
}

/// Validates `request` against the capability table entry it will be sent
/// to: output-token ceiling, streaming/function-calling support, and the
/// input-token estimate against the context window. Raises `InvalidRequest`
/// locally, before any network call.
pub fn validate_request_against(request: &Request, capability: &ModelCapability) -> Result<(), GatewayError> {
    if let Some(max_tokens) = request.max_tokens {
        if max_tokens > capability.max_output_tokens {
            return Err(GatewayError::invalid_request(format!(
                "max_tokens ({max_tokens}) exceeds model max_output_tokens ({})",
                capability.max_output_tokens
            )));
        }
    }
    if request.stream && !capability.supports_streaming {
        return Err(GatewayError::invalid_request("model does not support streaming"));
    }
    if !request.functions.is_empty() && !capability.supports_function_calling {
        return Err(GatewayError::invalid_request(
            "model does not support function calling",
        ));
    }
    let estimated_input_tokens = estimate_tokens(request);
    if estimated_input_tokens > capability.max_context_tokens {
        return Err(GatewayError::invalid_request(format!(
            "estimated input tokens ({estimated_input_tokens}) exceed model max_context_tokens ({})",
            capability.max_context_tokens
        )));
    }
    Ok(())
}

/// Resolves the model id a request will run against (explicit, or the
/// provider's default), confirms it is both known to `provider` and, when
/// `settings.allowed_model_ids` is non-empty, present in that allow-list,
/// then validates the request against its capability table. Adapters call
/// this once, right after their own `request.validate()`, in place of a bare
/// `request.model.clone().unwrap_or_else(...)`.
pub fn resolve_model(
    provider: ProviderId,
    request: &Request,
    settings: &ProviderSettings,
    default_model: &str,
) -> Result<(String, &'static ModelCapability), GatewayError> {
    let model_id = request.model.clone().unwrap_or_else(|| default_model.to_string());
    if !settings.allowed_model_ids.is_empty() && !settings.allowed_model_ids.iter().any(|id| id == &model_id) {
        return Err(GatewayError::ModelNotAvailable { provider, model_id });
    }
    let model = find_model(&model_id)
        .filter(|m| m.provider == provider)
        .ok_or_else(|| GatewayError::ModelNotAvailable {
            provider,
            model_id: model_id.clone(),
        })?;
    validate_request_against(request, &model.capabilities)?;
    Ok((model_id, &model.capabilities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_models() {
        assert!(find_model("gemini-1.5-pro").is_some());
        assert!(find_model("deepseek-chat").is_some());
        assert!(find_model("qwen-max").is_some());
        assert!(find_model("moonshot-v1-8k").is_some());
        assert!(find_model("not-a-real-model").is_none());
    }

    #[test]
    fn every_model_has_a_default_for_its_provider() {
        for provider in ProviderId::ALL {
            assert!(
                default_model_for(provider).is_some(),
                "provider {provider} has no models"
            );
        }
    }

    #[test]
    fn satisfies_checks_every_dimension() {
        let gemini = find_model("gemini-1.5-pro").unwrap();
        let needs_images = RequiredCapabilities {
            images: true,
            ..Default::default()
        };
        assert!(gemini.capabilities.satisfies(&needs_images));

        let turbo = find_model("qwen-turbo").unwrap();
        let needs_functions = RequiredCapabilities {
            function_calling: true,
            ..Default::default()
        };
        assert!(!turbo.capabilities.satisfies(&needs_functions));
    }

    #[test]
    fn cost_estimate_scales_linearly() {
        let model = find_model("deepseek-chat").unwrap();
        let cost = model.capabilities.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - (0.14 + 0.28)).abs() < 1e-9);
    }

    fn settings(allowed_model_ids: &[&str]) -> ProviderSettings {
        ProviderSettings {
            enabled: true,
            api_key: "key".to_string(),
            base_url: None,
            timeout_ms: 30_000,
            rate_limit_per_min: 60,
            priority: 0,
            allowed_model_ids: allowed_model_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn req(model: Option<&str>) -> Request {
        use crate::request::ChatMessage;
        Request {
            messages: vec![ChatMessage::user("hi")],
            model: model.map(str::to_string),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        }
    }

    #[test]
    fn rejects_max_tokens_above_model_ceiling() {
        let model = find_model("qwen-turbo").unwrap();
        let mut request = req(Some("qwen-turbo"));
        request.max_tokens = Some(model.capabilities.max_output_tokens + 1);
        assert!(validate_request_against(&request, &model.capabilities).is_err());
    }

    #[test]
    fn accepts_max_tokens_within_model_ceiling() {
        let model = find_model("qwen-turbo").unwrap();
        let mut request = req(Some("qwen-turbo"));
        request.max_tokens = Some(model.capabilities.max_output_tokens);
        assert!(validate_request_against(&request, &model.capabilities).is_ok());
    }

    #[test]
    fn rejects_streaming_when_unsupported_and_functions_when_unsupported() {
        let turbo = find_model("qwen-turbo").unwrap();
        let mut request = req(Some("qwen-turbo"));
        request.functions = vec![crate::request::FunctionSpec {
            name: "f".to_string(),
            description: "d".to_string(),
            parameters: serde_json::json!({}),
        }];
        assert!(validate_request_against(&request, &turbo.capabilities).is_err());
    }

    #[test]
    fn resolve_model_rejects_unknown_model_id() {
        let err = resolve_model(
            ProviderId::Gemini,
            &req(Some("not-a-real-model")),
            &settings(&[]),
            "gemini-1.5-pro",
        )
        .unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_AVAILABLE");
    }

    #[test]
    fn resolve_model_rejects_model_belonging_to_another_provider() {
        let err = resolve_model(ProviderId::Gemini, &req(Some("qwen-max")), &settings(&[]), "gemini-1.5-pro")
            .unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_AVAILABLE");
    }

    #[test]
    fn resolve_model_honors_allowed_model_ids() {
        let allowed = settings(&["gemini-1.5-flash"]);
        let err = resolve_model(ProviderId::Gemini, &req(Some("gemini-1.5-pro")), &allowed, "gemini-1.5-pro")
            .unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_AVAILABLE");

        let ok = resolve_model(
            ProviderId::Gemini,
            &req(Some("gemini-1.5-flash")),
            &allowed,
            "gemini-1.5-pro",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn resolve_model_falls_back_to_default_when_unset() {
        let (model_id, _) = resolve_model(ProviderId::Gemini, &req(None), &settings(&[]), "gemini-1.5-pro").unwrap();
        assert_eq!(model_id, "gemini-1.5-pro");
    }
}
