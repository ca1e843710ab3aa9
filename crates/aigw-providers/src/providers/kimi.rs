use aigw_common::ProviderId;
use aigw_provider_core::ProviderSettings;

use crate::impl_openai_compatible_provider;
use crate::providers::openai_compatible::OpenAiCompatible;

const DEFAULT_BASE_URL: &str = "https://api.moonshot.cn";
const DEFAULT_MODEL: &str = "moonshot-v1-8k";

pub struct KimiProvider {
    inner: OpenAiCompatible,
}

impl KimiProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            inner: OpenAiCompatible::new(ProviderId::Kimi, DEFAULT_BASE_URL, DEFAULT_MODEL, settings),
        }
    }
}

impl_openai_compatible_provider!(KimiProvider, ProviderId::Kimi);
