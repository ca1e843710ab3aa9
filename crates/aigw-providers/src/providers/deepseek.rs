use aigw_common::ProviderId;
use aigw_provider_core::ProviderSettings;

use crate::impl_openai_compatible_provider;
use crate::providers::openai_compatible::OpenAiCompatible;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";

pub struct DeepSeekProvider {
    inner: OpenAiCompatible,
}

impl DeepSeekProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            inner: OpenAiCompatible::new(ProviderId::DeepSeek, DEFAULT_BASE_URL, DEFAULT_MODEL, settings),
        }
    }
}

impl_openai_compatible_provider!(DeepSeekProvider, ProviderId::DeepSeek);
