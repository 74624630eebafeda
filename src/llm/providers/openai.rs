

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::base::{LlmMetadata, LlmProvider, LlmProviderError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    r#type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Any `/chat/completions` endpoint speaking the OpenAI wire format (DashScope, OpenAI, vLLM).
pub struct OpenAiCompatProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl OpenAiCompatProvider {

    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout_secs: u64,
    ) -> Result<Self, LlmProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!("OpenAI-compatible provider initialized (model={}, url={})", model, base_url);
        Ok(Self {
            api_key,
            base_url,
            model,
            temperature,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_format: Option<&str>,
    ) -> Result<(String, LlmMetadata), LlmProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
            stream: false,
            response_format: response_format.map(|f| ResponseFormat { r#type: f }),
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmProviderError::Provider("No choices in response".to_string()))?
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmProviderError::EmptyResponse)?;

        let mut metadata = LlmMetadata {
            provider: "openai".to_string(),
            model: self.model.clone(),
            base_url: Some(self.base_url.clone()),
            ..Default::default()
        };

        if let Some(usage) = response.usage {
            debug!(
                "Completion usage: {} prompt / {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
            metadata.tokens_prompt = Some(usage.prompt_tokens);
            metadata.tokens_completion = Some(usage.completion_tokens);
        }

        Ok((content, metadata))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_sends_auth_and_json_mode() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen-plus",
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"P\": [\"ICU patients\"]}"}}],
                    "usage": {"prompt_tokens": 40, "completion_tokens": 10, "total_tokens": 50}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new(
            Some("sk-test".to_string()),
            server.url(),
            "qwen-plus",
            0.3,
            5,
        )
        .unwrap();
        let (content, metadata) = provider
            .generate("system", "user", Some("json_object"))
            .await
            .unwrap();

        assert_eq!(content, "{\"P\": [\"ICU patients\"]}");
        assert_eq!(metadata.tokens_completion, Some(10));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_propagates() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("{\"error\": \"invalid key\"}")
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new(None, server.url(), "qwen-plus", 0.3, 5).unwrap();
        let err = provider.generate("s", "u", None).await.unwrap_err();
        assert!(matches!(err, LlmProviderError::Http(_)));
    }

    #[tokio::test]
    async fn test_no_choices_is_provider_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new(None, server.url(), "qwen-plus", 0.3, 5).unwrap();
        let err = provider.generate("s", "u", None).await.unwrap_err();
        assert!(matches!(err, LlmProviderError::Provider(_)));
    }
}
