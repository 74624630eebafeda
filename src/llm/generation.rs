

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::prompts::{
    PICOS_SYSTEM_PROMPT, SYNONYM_SYSTEM_PROMPT, build_picos_prompt, build_synonym_prompt,
};
use super::providers::base::{LlmProvider, LlmProviderError};
use crate::safe_truncate_ellipsis;

/// Generative text capability with one method per prompt template.
///
/// Implementations return the raw completion; callers own the parsing.
#[async_trait]
pub trait TextGenerationService: Send + Sync {

    async fn picos_breakdown(&self, topic: &str) -> Result<String, LlmProviderError>;


    async fn synonyms(&self, phrase: &str) -> Result<String, LlmProviderError>;
}


pub struct LlmTextGenerator {
    provider: Arc<dyn LlmProvider>,
}

impl LlmTextGenerator {

    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmProviderError> {
        let (content, metadata) = self
            .provider
            .generate(system_prompt, user_prompt, Some("json_object"))
            .await?;

        debug!(
            "{}/{} replied (fallback={}): {}",
            metadata.provider,
            metadata.model,
            metadata.fallback_used,
            safe_truncate_ellipsis(&content, 120)
        );
        Ok(content)
    }
}

#[async_trait]
impl TextGenerationService for LlmTextGenerator {
    async fn picos_breakdown(&self, topic: &str) -> Result<String, LlmProviderError> {
        self.complete(PICOS_SYSTEM_PROMPT, &build_picos_prompt(topic)).await
    }

    async fn synonyms(&self, phrase: &str) -> Result<String, LlmProviderError> {
        self.complete(SYNONYM_SYSTEM_PROMPT, &build_synonym_prompt(phrase)).await
    }
}
