//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod gemini;
pub mod openai_compatible;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML).  It may be
/// `None` for keyless local OpenAI-compatible servers; Gemini requires one.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::new(config.dummy_reply.clone()))),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.max_tokens,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        "gemini" => {
            let key = api_key.ok_or_else(|| ProviderError::MissingKey("gemini".into()))?;
            let g = &config.gemini;
            let p = gemini::GeminiProvider::new(
                g.api_base_url.clone(),
                g.model.clone(),
                g.temperature,
                g.timeout_seconds,
                key,
            )?;
            Ok(LlmProvider::Gemini(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_dummy_by_default() {
        let cfg = Config::default();
        let p = build(&cfg.llm, None).unwrap();
        assert_eq!(p.name(), "dummy");
    }

    #[test]
    fn gemini_requires_key() {
        let mut cfg = Config::default();
        cfg.llm.provider = "gemini".into();
        assert!(matches!(build(&cfg.llm, None), Err(ProviderError::MissingKey(_))));
        assert_eq!(build(&cfg.llm, Some("k".into())).unwrap().name(), "gemini");
    }

    #[test]
    fn openai_allows_keyless() {
        let mut cfg = Config::default();
        cfg.llm.provider = "openai".into();
        assert_eq!(build(&cfg.llm, None).unwrap().name(), "openai");
    }

    #[test]
    fn unknown_provider_errors() {
        let mut cfg = Config::default();
        cfg.llm.provider = "mystery".into();
        assert!(matches!(build(&cfg.llm, None), Err(ProviderError::UnknownProvider(_))));
    }
}
