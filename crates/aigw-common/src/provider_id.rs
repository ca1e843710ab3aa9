use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one of the upstream generative-text providers the gateway knows
/// how to speak to, or the in-process mock used by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    DeepSeek,
    Qwen,
    Kimi,
    Mock,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::Gemini,
        ProviderId::DeepSeek,
        ProviderId::Qwen,
        ProviderId::Kimi,
        ProviderId::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Qwen => "qwen",
            ProviderId::Kimi => "kimi",
            ProviderId::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "deepseek" => Ok(ProviderId::DeepSeek),
            "qwen" => Ok(ProviderId::Qwen),
            "kimi" => Ok(ProviderId::Kimi),
            "mock" => Ok(ProviderId::Mock),
            other => Err(format!("unknown provider id: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for provider in ProviderId::ALL {
            let parsed: ProviderId = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn rejects_unknown() {
        assert!("not-a-provider".parse::<ProviderId>().is_err());
    }
}
