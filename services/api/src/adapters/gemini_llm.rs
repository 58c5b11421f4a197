//! services/api/src/adapters/gemini_llm.rs
//!
//! This module contains the adapter for the chat companion's language model.
//! It talks to Gemini through its OpenAI-compatible endpoint and implements the
//! `GenerativeTextService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use exit_core::ports::{GenerativeTextService, PortError, PortResult};
use tracing::{debug, error};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeTextService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct GeminiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl GeminiChatAdapter {
    /// Creates a new `GeminiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Builds a client pointed at the given OpenAI-compatible base URL.
    pub fn client_for(api_key: &str, base_url: &str) -> Client<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Client::with_config(config)
    }
}

//=========================================================================================
// `GenerativeTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeTextService for GeminiChatAdapter {
    /// Sends the whole prompt as a single user message and returns the first choice.
    async fn generate_reply(&self, prompt: &str) -> PortResult<String> {
        debug!("Sending {} byte prompt to {}", prompt.len(), self.model);

        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| {
                error!("Gemini API error: {}", e);
                PortError::Unexpected(e.to_string())
            })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(PortError::Unexpected(
                "Chat model returned no text content.".to_string(),
            ));
        }
        Ok(text)
    }
}
