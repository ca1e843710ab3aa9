use std::time::Duration;

use serde::{Deserialize, Serialize};

use aigw_common::ProviderId;

/// Settings common to every provider, regardless of wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Secret. Never logged; adapters must not include it in error messages.
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_min: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub allowed_model_ids: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_rate_limit() -> u32 {
    60
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self, provider: ProviderId) -> Result<(), aigw_common::GatewayError> {
        if self.enabled && self.api_key.trim().is_empty() {
            return Err(aigw_common::GatewayError::invalid_request(format!(
                "provider {provider} is enabled but has no api key configured"
            )));
        }
        Ok(())
    }
}

/// Per-provider configuration, tagged by provider so a single config map can
/// hold heterogeneous settings without losing which kind backs each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini(ProviderSettings),
    DeepSeek(ProviderSettings),
    Qwen(ProviderSettings),
    Kimi(ProviderSettings),
    Mock(ProviderSettings),
}

impl ProviderConfig {
    pub fn id(&self) -> ProviderId {
        match self {
            ProviderConfig::Gemini(_) => ProviderId::Gemini,
            ProviderConfig::DeepSeek(_) => ProviderId::DeepSeek,
            ProviderConfig::Qwen(_) => ProviderId::Qwen,
            ProviderConfig::Kimi(_) => ProviderId::Kimi,
            ProviderConfig::Mock(_) => ProviderId::Mock,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        match self {
            ProviderConfig::Gemini(s)
            | ProviderConfig::DeepSeek(s)
            | ProviderConfig::Qwen(s)
            | ProviderConfig::Kimi(s)
            | ProviderConfig::Mock(s) => s,
        }
    }

    pub fn validate(&self) -> Result<(), aigw_common::GatewayError> {
        self.settings().validate(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, api_key: &str) -> ProviderSettings {
        ProviderSettings {
            enabled,
            api_key: api_key.to_string(),
            base_url: None,
            timeout_ms: default_timeout_ms(),
            rate_limit_per_min: default_rate_limit(),
            priority: 0,
            allowed_model_ids: vec![],
        }
    }

    #[test]
    fn enabled_without_key_is_invalid() {
        let cfg = ProviderConfig::Gemini(settings(true, ""));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_without_key_is_fine() {
        let cfg = ProviderConfig::Gemini(settings(false, ""));
        assert!(cfg.validate().is_ok());
    }
}
