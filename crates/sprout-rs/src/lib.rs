//! Prompt building, response classification and media relay for an AI
//! tutoring backend.
//!
//! `sprout-rs` sits between a web client and an OpenAI-compatible provider.
//! It turns a tutoring situation (subject, step, context, response type)
//! into a system prompt, forwards it to the provider, and shapes the reply
//! into structured feedback the client can render.
//!
//! # Getting started
//!
//! ```ignore
//! use sprout_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENAI_API_KEY").unwrap();
//!     let client = ProviderClient::new(api_key)?;
//!     let media = MediaStore::new("static");
//!     let tutor = Tutor::new(client, TutorConfig::default(), media);
//!
//!     let result = tutor
//!         .analyze_response(&AnalysisRequest {
//!             student_response: "7 + 5 = 13".into(),
//!             context: "Add 7 and 5".into(),
//!             subject: "Math".into(),
//!             current_step: 1,
//!             total_steps: 3,
//!         })
//!         .await
//!         .map_err(|e| e.to_string())?;
//!     println!("correct={} confusion={}", result.is_correct, result.confusion_level);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **System prompts:** [`prompt`]: [`LearningTurn`](prompt::LearningTurn)
//!   renders one template per [`ResponseType`](prompt::ResponseType) and adds
//!   the final-step addendum.
//! - **Feedback extraction:** [`classify`]: structured function-call output
//!   first, regex heuristics second.
//! - **Tutorial mode:** [`tutorial`]: educational-content detection and
//!   learning-step parsing.
//! - **Uploaded images and speech audio:** [`media`].
//! - **End-to-end flows:** [`Tutor`](tutor::Tutor) wires the above to a
//!   [`ProviderClient`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`prompt`] | Prompt templates for analysis, guidance turns, images and lessons |
//! | [`classify`] | [`AnalysisResult`](classify::AnalysisResult) extraction |
//! | [`tutorial`] | Tutorial-mode detection and learning-step derivation |
//! | [`explain`] | Step-by-step [`Explanation`](explain::Explanation) parsing |
//! | [`media`] | [`MediaStore`](media::MediaStore) for uploads and synthesized audio |
//! | [`config`] | [`TutorConfig`](config::TutorConfig) model and limit settings |
//! | [`tutor`] | [`Tutor`](tutor::Tutor) request flows |

pub mod classify;
pub mod config;
pub mod explain;
pub mod media;
pub mod prelude;
pub mod prompt;
pub mod tutor;
pub mod tutorial;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

/// Default base URL of the OpenAI-compatible provider.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the `serde_json::Value` that the function-calling API expects.
///
/// # Example
///
/// ```
/// use sprout_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Verdict {
///     correct: bool,
///     #[serde(default)]
///     note: Option<String>,
/// }
///
/// let schema = json_schema_for::<Verdict>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"correct".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Speech synthesis request body (`POST /audio/speech`).
#[derive(Serialize, Debug, Clone)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Message body: either plain text or a list of typed parts (text and
/// images) for vision-capable models.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageUrl {
    pub url: String,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(MessageContent::Text(content.into())),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(MessageContent::Text(content.into())),
        }
    }

    /// A user message carrying a question and an image URL.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ])),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(MessageContent::Text(content.into())),
        }
    }

    /// A plain-text message with an explicit role, as relayed from a client.
    pub fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        match role {
            MessageRole::System => Self::system(content),
            MessageRole::User => Self::user(content),
            MessageRole::Assistant => Self::assistant_text(content),
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Forces the model to call one named function.
#[derive(Serialize, Clone, Debug)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: ToolChoiceFunction,
}

#[derive(Serialize, Clone, Debug)]
pub struct ToolChoiceFunction {
    pub name: String,
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: ToolChoiceFunction { name: name.into() },
        }
    }
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`ProviderClient::chat()`].
#[derive(Debug, Default, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatCompletion {
    /// A text-only completion.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// No tool call and no (non-blank) text.
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
            && self
                .content
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
    }

    /// The text body, or `Err` if the provider returned none.
    pub fn into_text(self) -> Result<String, String> {
        self.content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| EMPTY_COMPLETION.to_string())
    }
}

/// Error text for a completion with nothing in it.
pub const EMPTY_COMPLETION: &str = "provider returned an empty completion";

/// Token usage statistics, logged per call.
#[derive(Deserialize, Debug)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible provider (chat completions,
/// vision and speech synthesis).
///
/// Constructed explicitly and handed to whatever needs it; there is no
/// process-wide key.
pub struct ProviderClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
}

impl ProviderClient {
    /// Create a new client against [`DEFAULT_BASE_URL`].
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a new client against a custom base URL (proxy, mock server).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("sprout-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        let tool_count = body.tools.as_ref().map_or(0, |t| t.len());
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            tool_count,
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("provider API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("provider API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        match parsed.choices.and_then(|c| c.into_iter().next()) {
            Some(c) => {
                let tool_calls = c.message.tool_calls.unwrap_or_default();
                debug!(
                    "LLM output: {} chars text, {} tool call(s), finish={}",
                    c.message.content.as_ref().map_or(0, |s| s.len()),
                    tool_calls.len(),
                    c.finish_reason.as_deref().unwrap_or("unknown")
                );
                Ok(ChatCompletion {
                    content: c.message.content,
                    tool_calls,
                })
            }
            None => {
                debug!("LLM output: empty (no choices)");
                Ok(ChatCompletion::default())
            }
        }
    }

    /// Synthesize speech and return the raw audio bytes.
    pub async fn speech(&self, body: &SpeechRequest) -> Result<Vec<u8>, String> {
        debug!(
            "TTS request: model={}, voice={}, input={} chars",
            body.model,
            body.voice,
            body.input.chars().count()
        );
        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("provider API HTTP {status}: {text}"));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("failed to read audio: {e}"))?;
        debug!(
            "TTS response: {} bytes in {:.1}s",
            bytes.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, Some(MessageContent::Text("hello".into())));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::with_role(MessageRole::Assistant, "earlier reply");
        assert_eq!(assist.role, MessageRole::Assistant);
        let json = serde_json::to_value(&assist).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "earlier reply"}));
    }

    #[test]
    fn relayed_roles_deserialize_lowercase() {
        let role: MessageRole = serde_json::from_str(r#""assistant""#).unwrap();
        assert_eq!(role, MessageRole::Assistant);
        assert!(serde_json::from_str::<MessageRole>(r#""narrator""#).is_err());
    }

    #[test]
    fn image_message_serializes_as_parts() {
        let msg = Message::user_with_image("What's in this image?", "http://x/a.png");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "http://x/a.png");
        assert_eq!(json["content"][0]["text"], "What's in this image?");
    }

    #[test]
    fn chat_request_default_skips_none_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn tool_choice_names_function() {
        let json = serde_json::to_value(ToolChoice::function("record_analysis")).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "record_analysis");
    }

    #[test]
    fn emptiness_counts_tool_calls_and_text() {
        assert!(ChatCompletion::default().is_empty());
        assert!(ChatCompletion::from_text(" \n ").is_empty());
        assert!(!ChatCompletion::from_text("ok").is_empty());

        let call = ChatCompletion {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                call_type: CallType::Function,
                function: FunctionCallData {
                    name: "record_analysis".into(),
                    arguments: "{}".into(),
                },
            }],
        };
        assert!(!call.is_empty());
    }

    #[test]
    fn empty_completion_is_an_error() {
        assert!(ChatCompletion::default().into_text().is_err());
        assert!(ChatCompletion::from_text("   ").into_text().is_err());
        assert_eq!(
            ChatCompletion::from_text("ok").into_text().unwrap(),
            "ok".to_string()
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ProviderClient::with_base_url("k", "http://localhost:9/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9/v1");
    }
}
