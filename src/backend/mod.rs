//! Inference backends: schema-constrained chat completion over text + images.
//!
//! The pipeline never talks to a model API directly. It builds an
//! [`InferenceRequest`] (role-tagged messages, a model id, an
//! [`OutputSchema`] and an optional output bound) and hands it to an
//! [`InferenceBackend`]. Two implementations ship with the crate:
//!
//! * [`openai::OpenAiBackend`]: OpenAI chat completions with a strict
//!   `json_schema` response format (the default).
//! * [`provider::ProviderBackend`]: any `edgequake_llm::LLMProvider`; the
//!   schema is carried in the instruction text.
//!
//! Tests substitute an in-memory backend through the same trait.

pub mod openai;
pub mod provider;

use crate::error::DigestError;
use crate::pipeline::encode::EncodedImage;
use crate::schema::OutputSchema;
use async_trait::async_trait;
use thiserror::Error;

/// Who a message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// One role-tagged message, optionally carrying inline images.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    pub role: Role,
    pub text: String,
    pub images: Vec<EncodedImage>,
}

impl RequestMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// A user message whose content is only the given image.
    pub fn user_image(image: EncodedImage) -> Self {
        Self {
            role: Role::User,
            text: String::new(),
            images: vec![image],
        }
    }
}

/// A complete schema-constrained inference request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub schema: OutputSchema,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// What a backend returned: the raw payload plus accounting.
///
/// `content` is not yet validated; callers run it through
/// [`crate::schema::parse_structured`].
#[derive(Debug, Clone, Default)]
pub struct InferenceReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// The backend stopped at the output-token bound.
    pub truncated: bool,
}

/// Failures a backend can report. Stages wrap these in
/// [`DigestError::InferenceFailed`] together with the page or review target.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network, TLS, or client-side failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered 2xx but with no usable message content.
    #[error("empty response: {0}")]
    EmptyResponse(String),

    /// The model declined to answer (refusal or content filter).
    #[error("model refused: {0}")]
    Refused(String),
}

/// A schema-constrained chat-completion capability.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name for logs, e.g. `"openai"`.
    fn name(&self) -> &str;

    /// Precondition check run before any request is built or sent.
    ///
    /// Backends that need an API key return
    /// [`DigestError::MissingCredential`] here when none is configured.
    fn check_credential(&self) -> Result<(), DigestError> {
        Ok(())
    }

    /// Send one request and return the raw reply.
    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(RequestMessage::system("x").role, Role::System);
        assert_eq!(RequestMessage::user("x").role, Role::User);
        let img = EncodedImage {
            mime_type: "image/png",
            data: "AAAA".into(),
        };
        let m = RequestMessage::user_image(img);
        assert_eq!(m.role, Role::User);
        assert!(m.text.is_empty());
        assert_eq!(m.images.len(), 1);
    }

    #[test]
    fn status_error_display() {
        let e = BackendError::Status {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(e.to_string(), "HTTP 429: rate limited");
    }
}
