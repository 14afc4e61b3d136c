//! Adapter that serves inference through any `edgequake_llm::LLMProvider`.
//!
//! Non-OpenAI providers have no structured-output switch, so the schema is
//! appended as a final system message asking for a bare JSON object. The
//! reply is validated locally like any other backend's.

use super::{BackendError, InferenceBackend, InferenceReply, InferenceRequest, Role};
use crate::error::DigestError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;

/// Wraps a pre-built edgequake-llm provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Build a provider by name (`"anthropic"`, `"gemini"`, `"ollama"`, …).
    ///
    /// The provider reads its own credential from the environment; a missing
    /// key surfaces here as [`DigestError::MissingCredential`]. Any other
    /// factory failure (unknown provider, bad model) is
    /// [`DigestError::InvalidConfig`].
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, DigestError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model)
            .map_err(|e| provider_error(provider_name, &e.to_string()))?;
        Ok(Self::new(provider, provider_name))
    }
}

/// Classify a provider factory failure by its message.
fn provider_error(provider_name: &str, message: &str) -> DigestError {
    const CREDENTIAL_MARKERS: [&str; 5] = ["api key", "api_key", "credential", "token", "not set"];

    let lower = message.to_lowercase();
    if CREDENTIAL_MARKERS.iter().any(|m| lower.contains(m)) {
        DigestError::MissingCredential {
            hint: format!("provider '{provider_name}' has no usable credential: {message}"),
        }
    } else {
        DigestError::InvalidConfig(format!(
            "provider '{provider_name}' could not be configured: {message}"
        ))
    }
}

/// The instruction appended to every request so the model answers in shape.
pub(crate) fn schema_instruction(request: &InferenceRequest) -> String {
    format!(
        "Respond with a single JSON object named \"{}\" ({}) that conforms exactly to this \
JSON Schema. Output only the JSON object, with no commentary and no code fences.\n\n{}",
        request.schema.name,
        request.schema.description,
        request.schema.schema
    )
}

fn to_chat_messages(request: &InferenceRequest) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = request
        .messages
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::system(m.text.as_str()),
            Role::User if m.images.is_empty() => ChatMessage::user(m.text.as_str()),
            Role::User => ChatMessage::user_with_images(
                m.text.as_str(),
                m.images.iter().map(|img| img.to_image_data()).collect(),
            ),
        })
        .collect();
    messages.push(ChatMessage::system(schema_instruction(request)));
    messages
}

#[async_trait]
impl InferenceBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, BackendError> {
        let messages = to_chat_messages(request);
        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(BackendError::EmptyResponse(format!(
                "{} returned no content",
                self.label
            )));
        }

        Ok(InferenceReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            truncated: false,
        })
    }
}
