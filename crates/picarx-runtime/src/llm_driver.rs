//! [`LlmDriver`] – OpenAI-compatible chat-completions client.
//!
//! Talks to any server exposing `/v1/chat/completions` (Ollama on
//! `http://localhost:11434`, a hosted OpenAI-compatible API, ...).  Every
//! request carries a `response_format` built from the JSON Schema of the
//! expected reply type, so the model is forced into strictly typed output
//! that is deserialized on arrival.
//!
//! The client is blocking: navigation runs synchronously on the caller's
//! thread, and classification happens before any navigation starts.
//!
//! # Example
//!
//! ```rust,no_run
//! use picarx_runtime::llm_driver::{ChatMessage, LlmDriver};
//! use picarx_types::VisualMatch;
//!
//! let driver = LlmDriver::new("http://localhost:11434", "llava");
//!
//! let messages = vec![
//!     ChatMessage::system("You are the eyes of a small robot car."),
//!     ChatMessage::user("Is there a red ball in front of you?"),
//! ];
//!
//! // Requires a running model server.
//! // let reply: VisualMatch = driver.complete_structured(&messages).unwrap();
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use picarx_types::PicarError;
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for PicarError {
    fn from(e: LlmError) -> Self {
        PicarError::ServiceUnavailable(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Plain text, or a list of text and image parts for vision requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// A `data:<mime>;base64,<payload>` URL.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message carrying `text` and one inline image.
    pub fn user_with_image(text: impl Into<String>, mime: &str, bytes: &[u8]) -> Self {
        let url = format!("data:{mime};base64,{}", BASE64.encode(bytes));
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                },
            ]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Build the `json_schema` object for reply type `T`.
fn schema_format<T: JsonSchema>() -> ResponseFormat {
    let schema = serde_json::to_value(schema_for!(T)).unwrap_or(serde_json::Value::Null);
    ResponseFormat {
        kind: "json_schema",
        json_schema: serde_json::json!({
            "name": T::schema_name(),
            "schema": schema,
        }),
    }
}

/// Parse the assistant's reply, tolerating a surrounding Markdown code fence.
fn parse_reply<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| LlmError::BadResponse(format!("{e}: {}", truncate(trimmed, 200))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// A blocking client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and share; the inner connection pool is reused.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl LlmDriver {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.  Empty keys are
    /// ignored (local Ollama needs none).
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` and deserialize the reply as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the reply is missing or does not match
    /// `T`'s schema.
    pub fn complete_structured<T>(&self, messages: &[ChatMessage]) -> Result<T, LlmError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            temperature: 0.0,
            response_format: schema_format::<T>(),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request.send()?.error_for_status()?.json()?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))?;
        debug!(model = %self.model, reply = %truncate(&content, 200), "llm reply");
        parse_reply(&content)
    }
}
