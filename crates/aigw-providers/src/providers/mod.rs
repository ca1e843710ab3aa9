pub mod deepseek;
pub mod gemini;
pub mod kimi;
pub mod mock;
pub mod openai_compatible;
pub mod qwen;

pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use kimi::KimiProvider;
pub use mock::{MockProvider, MockResponse};
pub use qwen::QwenProvider;
