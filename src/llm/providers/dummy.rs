//! Dummy LLM provider. Returns a fixed reply, or echoes input back prefixed
//! with `[echo]`.  Used to exercise the full request path without an API key.

use crate::llm::ProviderError;

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    reply: Option<String>,
}

impl DummyProvider {
    pub fn new(reply: Option<String>) -> Self {
        Self { reply }
    }

    pub async fn complete(&self, content: &str) -> Result<String, ProviderError> {
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Ok(format!("[echo] {content}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_prefixes_echo() {
        let p = DummyProvider::default();
        assert_eq!(p.complete("hello").await.unwrap(), "[echo] hello");
    }

    #[tokio::test]
    async fn fixed_reply_wins() {
        let p = DummyProvider::new(Some("[]".into()));
        assert_eq!(p.complete("anything").await.unwrap(), "[]");
    }
}
