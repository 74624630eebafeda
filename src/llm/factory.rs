

use std::sync::Arc;

use super::providers::base::{LlmProvider, LlmProviderError};
use super::providers::fallback::LlmProviderWithFallback;
use super::providers::ollama::OllamaProvider;
use super::providers::openai::OpenAiCompatProvider;
use crate::core::config::PicosConfig;
use crate::core::error::{PicosError, Result};
use crate::{DEFAULT_LLM_BASE_URL, DEFAULT_OLLAMA_URL};


pub struct LlmProviderFactory;

impl LlmProviderFactory {

    pub fn create(
        provider: &str,
        model: &str,
        api_key: Option<&str>,
        base_url: Option<&str>,
        temperature: f64,
        timeout_secs: u64,
    ) -> Result<Arc<dyn LlmProvider>> {
        let base_url = base_url.unwrap_or(Self::default_base_url(provider));
        let provider: Arc<dyn LlmProvider> = match provider {
            "openai" | "dashscope" => Arc::new(
                OpenAiCompatProvider::new(
                    api_key.map(String::from),
                    base_url,
                    model,
                    temperature,
                    timeout_secs,
                )
                .map_err(Self::init_error)?,
            ),
            "ollama" => Arc::new(
                OllamaProvider::new(
                    base_url,
                    model,
                    temperature,
                    timeout_secs,
                )
                .map_err(Self::init_error)?,
            ),
            other => {
                return Err(PicosError::Config(format!(
                    "Unknown LLM provider: {other}. Supported: openai, dashscope, ollama"
                )));
            }
        };
        Ok(provider)
    }

    /// Endpoint used when no base URL is configured.
    pub fn default_base_url(provider: &str) -> &'static str {
        match provider {
            "ollama" => DEFAULT_OLLAMA_URL,
            _ => DEFAULT_LLM_BASE_URL,
        }
    }

    /// Builds the configured provider, wrapped with the local Ollama fallback when enabled.
    pub fn from_config(config: &PicosConfig) -> Result<Arc<dyn LlmProvider>> {
        let primary = Self::create(
            &config.llm_provider,
            &config.llm_model,
            config.llm_api_key.as_deref(),
            config.llm_base_url.as_deref(),
            config.llm_temperature,
            config.timeout,
        )?;

        if !config.llm_fallback_enabled {
            return Ok(primary);
        }

        let fallback = OllamaProvider::new(
            &config.llm_fallback_url,
            &config.llm_fallback_model,
            config.llm_temperature,
            config.timeout,
        )
        .map_err(Self::init_error)?;

        Ok(Arc::new(LlmProviderWithFallback::new(
            primary,
            Some(Arc::new(fallback)),
        )))
    }

    fn init_error(err: LlmProviderError) -> PicosError {
        PicosError::Config(format!("Failed to initialize LLM provider: {err}"))
    }
}
