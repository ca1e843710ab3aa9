use std::fmt;

use serde_json::json;
use sha2::{Digest, Sha256};

use aigw_provider_core::Request;

/// Stable cache key derived from a request's identity tuple: messages,
/// model, temperature, top_p, max_tokens, system_prompt. Two requests that
/// differ only in `stream` or `functions` still fingerprint identically,
/// since streaming requests never reach the cache and `functions` does not
/// affect cacheable non-streaming output shape in this design.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

pub fn fingerprint(request: &Request) -> Fingerprint {
    let identity = json!({
        "messages": request.messages.iter().map(|m| json!({
            "role": m.role,
            "content": m.content,
        })).collect::<Vec<_>>(),
        "model": request.model,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "max_tokens": request.max_tokens,
        "system_prompt": request.system_prompt,
    });
    let canonical = serde_json::to_vec(&identity).expect("identity tuple is always serializable");
    let digest = Sha256::digest(&canonical);
    Fingerprint(digest.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigw_provider_core::ChatMessage;

    fn request(text: &str, model: &str) -> Request {
        Request {
            messages: vec![ChatMessage::user(text)],
            model: Some(model.to_string()),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            functions: vec![],
            system_prompt: None,
        }
    }

    #[test]
    fn identical_identity_tuples_fingerprint_equal() {
        let a = fingerprint(&request("hi", "mock-model"));
        let b = fingerprint(&request("hi", "mock-model"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_fingerprints_differ() {
        let a = fingerprint(&request("hi", "mock-model"));
        let b = fingerprint(&request("bye", "mock-model"));
        assert_ne!(a, b);
    }

    #[test]
    fn stream_flag_does_not_affect_fingerprint() {
        let mut streaming = request("hi", "mock-model");
        streaming.stream = true;
        let plain = request("hi", "mock-model");
        assert_eq!(fingerprint(&streaming), fingerprint(&plain));
    }
}
