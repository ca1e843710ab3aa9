//! Gemini adapter: `generativelanguage.googleapis.com`, API key in the query
//! string, `contents[]` message shape with `assistant -> model` role
//! rewriting and system messages lifted into a top-level `systemInstruction`.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{
    capability, ChunkStream, FinishReason, ModelInfo, Provider, ProviderSettings,
    RateLimitStatus, Request, Response, ResponseMetadata, Usage,
};

use crate::http::{build_client, map_status, map_transport_error};
use crate::stream_bridge::{bridge, ParsedEvent};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

pub struct GeminiProvider {
    settings: ProviderSettings,
    client: wreq::Client,
}

impl GeminiProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let client = build_client(
            std::time::Duration::from_secs(10),
            settings.timeout(),
        );
        Self { settings, client }
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
struct GeminiRequestBody {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemInstruction")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseBody {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

fn to_gemini_role(role: aigw_provider_core::MessageRole) -> Option<&'static str> {
    use aigw_provider_core::MessageRole;
    match role {
        MessageRole::User => Some("user"),
        MessageRole::Assistant => Some("model"),
        MessageRole::Function => Some("user"),
        MessageRole::System => None,
    }
}

fn build_body(request: &Request) -> GeminiRequestBody {
    let mut contents = Vec::new();
    let mut system_parts = Vec::new();

    for message in &request.messages {
        match to_gemini_role(message.role) {
            Some(role) => contents.push(GeminiContent {
                role: role.to_string(),
                parts: vec![GeminiPart {
                    text: message.content.clone(),
                }],
            }),
            None => system_parts.push(GeminiPart {
                text: message.content.clone(),
            }),
        }
    }
    if let Some(system_prompt) = &request.system_prompt {
        system_parts.push(GeminiPart {
            text: system_prompt.clone(),
        });
    }

    GeminiRequestBody {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(GeminiSystemInstruction { parts: system_parts })
        },
        generation_config: GeminiGenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_tokens,
        },
    }
}

fn finish_reason_from_gemini(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        self.settings.validate(ProviderId::Gemini)?;
        if self.settings.enabled && !self.health_check().await {
            return Err(GatewayError::Network {
                provider: ProviderId::Gemini,
                message: "initial health probe failed".to_string(),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let url = format!(
            "{}/v1beta/models?key={}",
            self.base_url(),
            self.settings.api_key
        );
        matches!(
            self.client
                .get(&url)
                .timeout(std::time::Duration::from_secs(5))
                .send()
                .await,
            Ok(resp) if resp.status().is_success()
        )
    }

    fn get_models(&self) -> Vec<ModelInfo> {
        capability::models_for_provider(ProviderId::Gemini).copied().collect()
    }

    async fn request(&self, request: &Request) -> Result<Response, GatewayError> {
        request.validate()?;
        let (model_id, _) = capability::resolve_model(ProviderId::Gemini, request, &self.settings, DEFAULT_MODEL)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url(),
            model_id,
            self.settings.api_key
        );
        let body = build_body(request);

        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Gemini, e))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| map_transport_error(ProviderId::Gemini, e))?;
        if !(200..300).contains(&status) {
            return Err(map_status(ProviderId::Gemini, status, &text));
        }

        let parsed: GeminiResponseBody = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Network {
                provider: ProviderId::Gemini,
                message: format!("failed to decode gemini response: {e}"),
            }
        })?;

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            GatewayError::Network {
                provider: ProviderId::Gemini,
                message: "gemini response had no candidates".to_string(),
            }
        })?;
        let content = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        let finish_reason = finish_reason_from_gemini(candidate.finish_reason.as_deref());
        let usage = parsed
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(Response {
            content,
            model_id,
            provider: ProviderId::Gemini,
            usage,
            metadata: ResponseMetadata {
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp_unix_ms: 0,
                finish_reason,
                function_call: None,
            },
        })
    }

    async fn stream_request(&self, request: &Request) -> Result<ChunkStream, GatewayError> {
        request.validate()?;
        let (model_id, _) = capability::resolve_model(ProviderId::Gemini, request, &self.settings, DEFAULT_MODEL)?;
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url(),
            model_id,
            self.settings.api_key
        );
        let body = build_body(request);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Gemini, e))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp
                .text()
                .await
                .map_err(|e| map_transport_error(ProviderId::Gemini, e))?;
            return Err(map_status(ProviderId::Gemini, status, &text));
        }

        let body_stream = resp.bytes_stream().map_err(|e| e.to_string());
        Ok(bridge(
            body_stream,
            ProviderId::Gemini,
            model_id,
            std::time::Duration::from_secs(30),
            parse_gemini_frame,
        ))
    }

    async fn get_rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            remaining: self.settings.rate_limit_per_min,
            limit: self.settings.rate_limit_per_min,
            reset_unix_ms: 0,
        }
    }
}

fn parse_gemini_frame(line: &str) -> Option<ParsedEvent> {
    let parsed: GeminiResponseBody = serde_json::from_str(line).ok()?;
    let candidate = parsed.candidates.into_iter().next()?;
    let text = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    if candidate.finish_reason.is_some() {
        let usage = parsed
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count));
        return Some(ParsedEvent::Done { text, usage });
    }
    if text.is_empty() {
        Some(ParsedEvent::Skip)
    } else {
        Some(ParsedEvent::Delta(text))
    }
}
