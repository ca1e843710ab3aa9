use serde::{Deserialize, Serialize};

use crate::capability::RequiredCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            function_call: None,
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            function_call: None,
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            function_call: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A chat-completion request, provider-agnostic.
///
/// Invariants (validated by `Request::validate` and again by each adapter
/// against its own model's capability table): `messages` is non-empty;
/// `temperature` and `top_p`, when present, lie in `[0.0, 1.0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Request {
    pub fn validate(&self) -> Result<(), aigw_common::GatewayError> {
        if self.messages.is_empty() {
            return Err(aigw_common::GatewayError::invalid_request(
                "messages must not be empty",
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(aigw_common::GatewayError::invalid_request(
                    "temperature must be in [0.0, 1.0]",
                ));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(aigw_common::GatewayError::invalid_request(
                    "top_p must be in [0.0, 1.0]",
                ));
            }
        }
        Ok(())
    }

    /// The capability set this request needs from whichever provider serves
    /// it, independent of any explicit routing criteria.
    pub fn required_capabilities(&self) -> RequiredCapabilities {
        RequiredCapabilities {
            streaming: self.stream,
            function_calling: !self.functions.is_empty(),
            images: false,
            documents: false,
            min_context_tokens: estimate_tokens(self),
        }
    }
}

/// Rough token estimate used for context-window validation: roughly one
/// token per four characters, summed across all messages and the system
/// prompt. Not meant to match any provider's exact tokenizer.
pub fn estimate_tokens(request: &Request) -> u32 {
    let mut chars: usize = request
        .messages
        .iter()
        .map(|m| m.content.chars().count())
        .sum();
    if let Some(system) = &request.system_prompt {
        chars += system.chars().count();
    }
    ((chars as f64) / 4.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_messages() {
        let req = Request {
            messages: vec![],
            model: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut req = Request {
            messages: vec![ChatMessage::user("hi")],
            model: None,
            max_tokens: None,
            temperature: Some(1.5),
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        };
        assert!(req.validate().is_err());
        req.temperature = Some(0.5);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn estimates_tokens_from_char_count() {
        let req = Request {
            messages: vec![ChatMessage::user("a".repeat(40))],
            model: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        };
        assert_eq!(estimate_tokens(&req), 10);
    }
}
