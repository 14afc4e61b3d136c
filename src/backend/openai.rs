//! OpenAI chat-completions backend with strict `json_schema` output.
//!
//! Images travel as `data:image/png;base64,…` URLs with `detail: "high"`,
//! the same encoding every OpenAI-compatible vision endpoint accepts.
//! The output bound is sent as `max_completion_tokens`.

use super::{BackendError, InferenceBackend, InferenceReply, InferenceRequest, Role};
use crate::error::DigestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Public OpenAI endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable the credential is read from by
/// [`crate::config::DigestConfig::from_env`].
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    description: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

// ── Backend ──────────────────────────────────────────────────────────────

/// Calls `{base_url}/chat/completions` with a bearer token.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a backend. A missing key is not an error until
    /// [`InferenceBackend::check_credential`] runs.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self, DigestError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DigestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn chat_request(request: &InferenceRequest) -> ChatRequest<'_> {
    let messages = request
        .messages
        .iter()
        .map(|m| {
            let mut content = Vec::with_capacity(1 + m.images.len());
            if !m.text.is_empty() {
                content.push(ContentPart::Text { text: &m.text });
            }
            for img in &m.images {
                content.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: img.data_url(),
                        detail: "high",
                    },
                });
            }
            Message {
                role: m.role.as_str(),
                content,
            }
        })
        .collect();

    ChatRequest {
        model: &request.model,
        messages,
        response_format: ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: request.schema.name,
                description: request.schema.description,
                schema: &request.schema.schema,
                strict: request.schema.strict,
            },
        },
        max_completion_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

fn into_reply(response: ChatResponse) -> Result<InferenceReply, BackendError> {
    let usage = response.usage;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::EmptyResponse("no choices returned".into()))?;

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
        return Err(BackendError::Refused(refusal));
    }
    let finish = choice.finish_reason.as_deref().unwrap_or("");
    if finish == "content_filter" {
        return Err(BackendError::Refused("content filter triggered".into()));
    }
    let content = choice
        .message
        .content
        .ok_or_else(|| BackendError::EmptyResponse("message has no content".into()))?;

    Ok(InferenceReply {
        content,
        prompt_tokens: usage.as_ref().map_or(0, |u| u.prompt_tokens),
        completion_tokens: usage.as_ref().map_or(0, |u| u.completion_tokens),
        truncated: finish == "length",
    })
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn check_credential(&self) -> Result<(), DigestError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(DigestError::MissingCredential {
                hint: format!("Set {API_KEY_ENV} or pass --api-key."),
            }),
        }
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, BackendError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Transport("no API key configured".into()))?;

        let body = chat_request(request);
        debug!(
            "POST {}/chat/completions model={} schema={} messages={}",
            self.base_url,
            request.model,
            request.schema.name,
            body.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::EmptyResponse(format!("malformed body: {e}")))?;
        into_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RequestMessage;
    use crate::pipeline::encode::EncodedImage;
    use crate::schema::extraction_schema;

    fn request() -> InferenceRequest {
        InferenceRequest {
            model: "gpt-4o".into(),
            messages: vec![
                RequestMessage::system("convert this page"),
                RequestMessage::user_image(EncodedImage {
                    mime_type: "image/png",
                    data: "iVBORw0K".into(),
                }),
            ],
            schema: extraction_schema(),
            max_tokens: Some(4096),
            temperature: Some(0.1),
        }
    }

    #[test]
    fn request_body_carries_strict_schema_and_image() {
        let req = request();
        let body = serde_json::to_value(chat_request(&req)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "extractionResult");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["additionalProperties"],
            false
        );
        assert_eq!(body["max_completion_tokens"], 4096);

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        let image = &body["messages"][1]["content"][0];
        assert_eq!(image["type"], "image_url");
        assert_eq!(image["image_url"]["url"], "data:image/png;base64,iVBORw0K");
        assert_eq!(image["image_url"]["detail"], "high");
        // Image-only message has no empty text part.
        assert_eq!(body["messages"][1]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn omitted_bounds_are_not_serialised() {
        let mut req = request();
        req.max_tokens = None;
        req.temperature = None;
        let body = serde_json::to_value(chat_request(&req)).unwrap();
        assert!(body.get("max_completion_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    fn response(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn reply_reports_usage_and_truncation() {
        let r = into_reply(response(
            r#"{"choices":[{"message":{"content":"{}"},"finish_reason":"length"}],
                "usage":{"prompt_tokens":10,"completion_tokens":20}}"#,
        ))
        .unwrap();
        assert_eq!(r.content, "{}");
        assert_eq!(r.prompt_tokens, 10);
        assert_eq!(r.completion_tokens, 20);
        assert!(r.truncated);
    }

    #[test]
    fn refusal_is_an_error() {
        let err = into_reply(response(
            r#"{"choices":[{"message":{"content":null,"refusal":"I can't"},"finish_reason":"stop"}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, BackendError::Refused(_)));
    }

    #[test]
    fn no_choices_is_an_error() {
        let err = into_reply(response(r#"{"choices":[]}"#)).unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse(_)));
    }

    #[test]
    fn blank_key_fails_credential_check() {
        let backend = OpenAiBackend::new(Some("  ".into()), DEFAULT_BASE_URL).unwrap();
        assert!(matches!(
            backend.check_credential(),
            Err(DigestError::MissingCredential { .. })
        ));
        let backend = OpenAiBackend::new(Some("sk-test".into()), DEFAULT_BASE_URL).unwrap();
        assert!(backend.check_credential().is_ok());
    }

    #[test]
    fn debug_redacts_key() {
        let backend = OpenAiBackend::new(Some("sk-secret".into()), DEFAULT_BASE_URL).unwrap();
        let dbg = format!("{backend:?}");
        assert!(!dbg.contains("sk-secret"));
    }
}
