//! Concrete upstream provider adapters: Gemini, DeepSeek, Qwen, Kimi, and an
//! in-process mock. Each implements `aigw_provider_core::Provider`.

pub mod http;
pub mod providers;
pub mod sse;
pub mod stream_bridge;

pub use providers::{DeepSeekProvider, GeminiProvider, KimiProvider, MockProvider, MockResponse, QwenProvider};
