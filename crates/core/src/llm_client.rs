//! Text generation client.
//!
//! The engine treats the language model as a black box: a system prompt and
//! a user prompt go in, text comes out. Failures are surfaced as errors here
//! and converted to `None` at the call sites via [`generate_or_none`].

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming completion call.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Calls the client and maps errors and blank output to `None`.
pub async fn generate_or_none(
    client: &dyn LLMClient,
    system_prompt: &str,
    user_prompt: &str,
) -> Option<String> {
    match client.generate(system_prompt, user_prompt).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            warn!("LLM returned an empty response");
            None
        }
        Err(e) => {
            warn!(error = ?e, "LLM generation failed");
            None
        }
    }
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            max_tokens: 4000,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.max_tokens)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM call complete"
            );
        }

        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_generate_or_none_trims_text() {
        let mut mock = MockLLMClient::new();
        mock.expect_generate()
            .returning(|_, _| Ok("  an answer \n".to_string()));
        assert_eq!(
            generate_or_none(&mock, "sys", "user").await,
            Some("an answer".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_or_none_maps_failures() {
        let mut mock = MockLLMClient::new();
        mock.expect_generate()
            .times(1)
            .returning(|_, _| Err(anyhow!("rate limited")));
        assert_eq!(generate_or_none(&mock, "sys", "user").await, None);

        let mut blank = MockLLMClient::new();
        blank.expect_generate().returning(|_, _| Ok("   ".to_string()));
        assert_eq!(generate_or_none(&blank, "sys", "user").await, None);
    }
}
