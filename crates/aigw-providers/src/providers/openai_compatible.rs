//! Shared translation for the OpenAI-compatible `/v1/chat/completions`
//! wire protocol used, with different base URLs and auth headers, by both
//! DeepSeek and Kimi.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{
    capability, ChunkStream, FinishReason, MessageRole, ProviderSettings, Request, Response,
    ResponseMetadata, Usage,
};

use crate::http::{build_client, map_status, map_transport_error};
use crate::stream_bridge::{bridge, ParsedEvent};

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "top_p", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "max_tokens", skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(rename = "prompt_tokens", default)]
    prompt_tokens: u32,
    #[serde(rename = "completion_tokens", default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiChoiceMessage>,
    #[serde(default)]
    delta: Option<OpenAiChoiceMessage>,
    #[serde(rename = "finish_reason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Function => "function",
    }
}

fn build_body(request: &Request, model_id: &str) -> OpenAiChatRequest {
    let mut messages: Vec<OpenAiMessage> = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(OpenAiMessage {
            role: "system",
            content: system.clone(),
        });
    }
    for message in &request.messages {
        messages.push(OpenAiMessage {
            role: role_str(message.role),
            content: message.content.clone(),
        });
    }
    OpenAiChatRequest {
        model: model_id.to_string(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stream: request.stream,
    }
}

fn finish_reason_from_openai(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("function_call") | Some("tool_calls") => FinishReason::FunctionCall,
        _ => FinishReason::Error,
    }
}

/// Everything an OpenAI-chat-shaped adapter needs beyond the shared request
/// translation: where to send it, how to authenticate, and which provider
/// id/model list to report as.
pub struct OpenAiCompatible {
    pub provider: ProviderId,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub settings: ProviderSettings,
    pub client: wreq::Client,
}

impl OpenAiCompatible {
    pub fn new(
        provider: ProviderId,
        default_base_url: &'static str,
        default_model: &'static str,
        settings: ProviderSettings,
    ) -> Self {
        let client = build_client(std::time::Duration::from_secs(10), settings.timeout());
        Self {
            provider,
            default_base_url,
            default_model,
            settings,
            client,
        }
    }

    fn base_url(&self) -> &str {
        self.settings
            .base_url
            .as_deref()
            .unwrap_or(self.default_base_url)
    }

    pub async fn health_check_impl(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url());
        matches!(
            self.client
                .get(&url)
                .bearer_auth(&self.settings.api_key)
                .timeout(std::time::Duration::from_secs(5))
                .send()
                .await,
            Ok(resp) if resp.status().is_success()
        )
    }

    pub async fn do_request(&self, request: &Request) -> Result<Response, GatewayError> {
        request.validate()?;
        let (model_id, _) = capability::resolve_model(self.provider, request, &self.settings, self.default_model)?;
        let url = format!("{}/v1/chat/completions", self.base_url());
        let body = build_body(request, &model_id);

        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(self.provider, e))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| map_transport_error(self.provider, e))?;
        if !(200..300).contains(&status) {
            return Err(map_status(self.provider, status, &text));
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Network {
                provider: self.provider,
                message: format!("failed to decode response: {e}"),
            }
        })?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            GatewayError::Network {
                provider: self.provider,
                message: "response had no choices".to_string(),
            }
        })?;
        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();
        let finish_reason = finish_reason_from_openai(choice.finish_reason.as_deref());
        let usage = parsed
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Response {
            content,
            model_id,
            provider: self.provider,
            usage,
            metadata: ResponseMetadata {
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp_unix_ms: 0,
                finish_reason,
                function_call: None,
            },
        })
    }

    pub async fn do_stream_request(&self, request: &Request) -> Result<ChunkStream, GatewayError> {
        request.validate()?;
        let (model_id, _) = capability::resolve_model(self.provider, request, &self.settings, self.default_model)?;
        let url = format!("{}/v1/chat/completions", self.base_url());
        let body = build_body(request, &model_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(self.provider, e))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp
                .text()
                .await
                .map_err(|e| map_transport_error(self.provider, e))?;
            return Err(map_status(self.provider, status, &text));
        }

        let provider = self.provider;
        let body_stream = resp.bytes_stream().map_err(|e| e.to_string());
        Ok(bridge(
            body_stream,
            provider,
            model_id,
            std::time::Duration::from_secs(30),
            parse_openai_frame,
        ))
    }
}

fn parse_openai_frame(line: &str) -> Option<ParsedEvent> {
    let parsed: OpenAiChatResponse = serde_json::from_str(line).ok()?;
    let choice = parsed.choices.into_iter().next()?;
    let text = choice
        .delta
        .and_then(|d| d.content)
        .unwrap_or_default();
    if choice.finish_reason.is_some() {
        let usage = parsed
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
        return Some(ParsedEvent::Done { text, usage });
    }
    if text.is_empty() {
        Some(ParsedEvent::Skip)
    } else {
        Some(ParsedEvent::Delta(text))
    }
}

/// Implements `Provider` for a concrete wrapper type by delegating every
/// method to an owned `OpenAiCompatible`. Both DeepSeek and Kimi use this
/// to avoid re-deriving the same trait impl twice.
#[macro_export]
macro_rules! impl_openai_compatible_provider {
    ($ty:ty, $provider_id:expr) => {
        #[async_trait::async_trait]
        impl aigw_provider_core::Provider for $ty {
            fn id(&self) -> aigw_common::ProviderId {
                $provider_id
            }

            async fn initialize(&self) -> Result<(), aigw_common::GatewayError> {
                self.inner.settings.validate($provider_id)?;
                if self.inner.settings.enabled && !self.inner.health_check_impl().await {
                    return Err(aigw_common::GatewayError::Network {
                        provider: $provider_id,
                        message: "initial health probe failed".to_string(),
                    });
                }
                Ok(())
            }

            async fn health_check(&self) -> bool {
                self.inner.health_check_impl().await
            }

            fn get_models(&self) -> Vec<aigw_provider_core::ModelInfo> {
                aigw_provider_core::capability::models_for_provider($provider_id)
                    .copied()
                    .collect()
            }

            async fn request(
                &self,
                request: &aigw_provider_core::Request,
            ) -> Result<aigw_provider_core::Response, aigw_common::GatewayError> {
                self.inner.do_request(request).await
            }

            async fn stream_request(
                &self,
                request: &aigw_provider_core::Request,
            ) -> Result<aigw_provider_core::ChunkStream, aigw_common::GatewayError> {
                self.inner.do_stream_request(request).await
            }

            async fn get_rate_limit_status(&self) -> aigw_provider_core::RateLimitStatus {
                aigw_provider_core::RateLimitStatus {
                    remaining: self.inner.settings.rate_limit_per_min,
                    limit: self.inner.settings.rate_limit_per_min,
                    reset_unix_ms: 0,
                }
            }
        }
    };
}
