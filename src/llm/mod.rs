//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! The `complete` method is `async fn` on the enum so callers need no
//! trait-object machinery.

pub mod providers;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key for provider {0} (set LLM_API_KEY)")]
    MissingKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

/// All available provider backends.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    Gemini(providers::gemini::GeminiProvider),
}

impl LlmProvider {
    /// Send `prompt` (with an optional system instruction) and return the
    /// model's text reply.
    pub async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(prompt).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(prompt, system).await,
            LlmProvider::Gemini(p) => p.complete(prompt, system).await,
        }
    }

    /// Short provider name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            LlmProvider::Gemini(_) => "gemini",
        }
    }
}
