//! Qwen (DashScope) adapter. Non-OpenAI shape: `input.messages`,
//! `parameters.{temperature,top_p,max_tokens,incremental_output}`, response
//! `output.{text,finish_reason}`, usage
//! `{input_tokens,output_tokens,total_tokens}`. Streaming is toggled by the
//! `X-DashScope-SSE` header rather than a `stream` body field.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

use aigw_common::{GatewayError, ProviderId};
use aigw_provider_core::{
    capability, ChunkStream, FinishReason, MessageRole, ModelInfo, Provider, ProviderSettings,
    RateLimitStatus, Request, Response, ResponseMetadata, Usage,
};

use crate::http::{build_client, map_status, map_transport_error};
use crate::stream_bridge::{bridge, ParsedEvent};

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
const DEFAULT_MODEL: &str = "qwen-max";
const ENDPOINT: &str = "/api/v1/services/aigc/text-generation/generation";

pub struct QwenProvider {
    settings: ProviderSettings,
    client: wreq::Client,
}

impl QwenProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let client = build_client(std::time::Duration::from_secs(10), settings.timeout());
        Self { settings, client }
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[derive(Serialize)]
struct QwenMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct QwenInput {
    messages: Vec<QwenMessage>,
}

#[derive(Serialize)]
struct QwenParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "top_p", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "max_tokens", skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    incremental_output: bool,
}

#[derive(Serialize)]
struct QwenRequestBody {
    model: String,
    input: QwenInput,
    parameters: QwenParameters,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Function => "user",
    }
}

fn build_body(request: &Request, model_id: &str) -> QwenRequestBody {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(QwenMessage {
            role: "system",
            content: system.clone(),
        });
    }
    for message in &request.messages {
        messages.push(QwenMessage {
            role: role_str(message.role),
            content: message.content.clone(),
        });
    }
    QwenRequestBody {
        model: model_id.to_string(),
        input: QwenInput { messages },
        parameters: QwenParameters {
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            incremental_output: request.stream,
        },
    }
}

#[derive(Deserialize)]
struct QwenUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct QwenOutput {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct QwenResponseBody {
    output: QwenOutput,
    #[serde(default)]
    usage: Option<QwenUsage>,
}

fn finish_reason_from_qwen(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") | Some("null") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

#[async_trait]
impl Provider for QwenProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Qwen
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        self.settings.validate(ProviderId::Qwen)?;
        if self.settings.enabled && !self.health_check().await {
            return Err(GatewayError::Network {
                provider: ProviderId::Qwen,
                message: "initial health probe failed".to_string(),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}{}", self.base_url(), ENDPOINT);
        let probe = build_body(
            &Request {
                messages: vec![aigw_provider_core::ChatMessage::user("ping")],
                model: None,
                max_tokens: Some(1),
                temperature: None,
                top_p: None,
                stream: false,
                functions: vec![],
                system_prompt: None,
            },
            DEFAULT_MODEL,
        );
        matches!(
            self.client
                .post(&url)
                .bearer_auth(&self.settings.api_key)
                .json(&probe)
                .timeout(std::time::Duration::from_secs(5))
                .send()
                .await,
            Ok(resp) if resp.status().is_success()
        )
    }

    fn get_models(&self) -> Vec<ModelInfo> {
        capability::models_for_provider(ProviderId::Qwen).copied().collect()
    }

    async fn request(&self, request: &Request) -> Result<Response, GatewayError> {
        request.validate()?;
        let (model_id, _) = capability::resolve_model(ProviderId::Qwen, request, &self.settings, DEFAULT_MODEL)?;
        let url = format!("{}{}", self.base_url(), ENDPOINT);
        let body = build_body(request, &model_id);

        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header("X-DashScope-SSE", "disable")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Qwen, e))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| map_transport_error(ProviderId::Qwen, e))?;
        if !(200..300).contains(&status) {
            return Err(map_status(ProviderId::Qwen, status, &text));
        }

        let parsed: QwenResponseBody = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Network {
                provider: ProviderId::Qwen,
                message: format!("failed to decode qwen response: {e}"),
            }
        })?;
        let finish_reason = finish_reason_from_qwen(parsed.output.finish_reason.as_deref());
        let usage = parsed
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        Ok(Response {
            content: parsed.output.text,
            model_id,
            provider: ProviderId::Qwen,
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
        let (model_id, _) = capability::resolve_model(ProviderId::Qwen, request, &self.settings, DEFAULT_MODEL)?;
        let url = format!("{}{}", self.base_url(), ENDPOINT);
        let body = build_body(request, &model_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header("X-DashScope-SSE", "enable")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Qwen, e))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp
                .text()
                .await
                .map_err(|e| map_transport_error(ProviderId::Qwen, e))?;
            return Err(map_status(ProviderId::Qwen, status, &text));
        }

        let body_stream = resp.bytes_stream().map_err(|e| e.to_string());
        Ok(bridge(
            body_stream,
            ProviderId::Qwen,
            model_id,
            std::time::Duration::from_secs(30),
            parse_qwen_frame,
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

fn parse_qwen_frame(line: &str) -> Option<ParsedEvent> {
    let parsed: QwenResponseBody = serde_json::from_str(line).ok()?;
    if let Some(reason) = parsed.output.finish_reason.as_deref() {
        if reason != "null" {
            let usage = parsed
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens));
            return Some(ParsedEvent::Done {
                text: parsed.output.text,
                usage,
            });
        }
    }
    if parsed.output.text.is_empty() {
        Some(ParsedEvent::Skip)
    } else {
        Some(ParsedEvent::Delta(parsed.output.text))
    }
}
