//! [`LlmDriver`] – OpenAI-compatible LLM interface.
//!
//! Communicates with a model server that exposes an OpenAI-compatible
//! `/v1/chat/completions` endpoint, such as [Ollama](https://ollama.com)
//! (`http://localhost:11434`), and implements the
//! [`LanguageModel`] boundary on top of it:
//!
//! - **greet** – one warm sentence addressed to the patient, built from the
//!   visitor's bio, last recorded mood and recent memories. The live camera
//!   frame is attached as an image part when it is a JPEG.
//! - **summarize** – the [`Consolidation`] JSON Schema is injected via
//!   `response_format` to force strictly typed output.
//!
//! [`CARE_GUIDELINES`] are appended to every system-role message.
//!
//! # Example
//!
//! ```rust,no_run
//! use reminisce_runtime::llm_driver::{LlmDriver, ChatMessage, Role};
//!
//! let driver = LlmDriver::new("http://localhost:11434", "llama3");
//!
//! let messages = vec![
//!     ChatMessage::text(Role::System, "You are a memory aid."),
//!     ChatMessage::text(Role::User, "Who is this?"),
//! ];
//!
//! // Requires a running Ollama instance – skipped in unit tests.
//! // let reply = driver.complete(&messages, None).await.unwrap();
//! ```

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reminisce_hal::CameraFrame;
use reminisce_types::{Consolidation, Identity, ReminisceError};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::providers::{GreetingRequest, LanguageModel};

// ─────────────────────────────────────────────────────────────────────────────
// Care guidelines
// ─────────────────────────────────────────────────────────────────────────────

/// Tone rules appended to every system-role message.
pub const CARE_GUIDELINES: &str = "\
## Care Guidelines
- The listener lives with memory loss. Use short, plain sentences.
- Never quiz the listener or ask them to remember something.
- Never correct the listener or mention their condition.
- Stay warm and calm; avoid exclamation marks.";

/// Recent memories included in the greeting prompt.
const GREETING_CONTEXT_ENTRIES: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from LLM driver operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    #[error("Model output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LlmError> for ReminisceError {
    fn from(e: LlmError) -> Self {
        ReminisceError::provider("language model", e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Plain text, or a list of parts when an image is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of every text part.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct JsonSchemaSpec {
    name: &'static str,
    schema: serde_json::Value,
}

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaSpec,
}

impl ResponseFormat {
    /// Require output matching the [`Consolidation`] schema.
    pub fn consolidation() -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaSpec {
                name: "consolidation",
                schema: serde_json::to_value(schema_for!(Consolidation))
                    .unwrap_or(serde_json::Value::Null),
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt construction
// ─────────────────────────────────────────────────────────────────────────────

/// Append [`CARE_GUIDELINES`] to every system message, prepending one when
/// the conversation has none.
fn with_guidelines(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut augmented: Vec<ChatMessage> = messages
        .iter()
        .map(|m| {
            if m.role == Role::System {
                ChatMessage::text(
                    Role::System,
                    format!("{}\n\n{}", m.content.as_text(), CARE_GUIDELINES),
                )
            } else {
                m.clone()
            }
        })
        .collect();
    if !augmented.iter().any(|m| m.role == Role::System) {
        augmented.insert(0, ChatMessage::text(Role::System, CARE_GUIDELINES));
    }
    augmented
}

pub fn greeting_prompt(identity: &Identity) -> String {
    let name = &identity.name;
    let mood = identity.last_emotion();
    let recent: Vec<&str> = identity
        .history
        .iter()
        .rev()
        .take(GREETING_CONTEXT_ENTRIES)
        .map(|e| e.summary.as_str())
        .collect();
    let recent = if recent.is_empty() {
        "none".to_string()
    } else {
        recent.join(" | ")
    };
    format!(
        "You are a memory aid for a dementia patient. The patient is holding this device.\n\
         You see {name} in the camera.\n\
         About {name}: {bio}\n\
         History: {name} was feeling {mood} last time. Recent memories: {recent}\n\n\
         Task: Address the *patient* (the user).\n\
         Tell them who is here ({name}) and offer a gentle reminder of who they are or how they felt last time.\n\
         Do NOT say \"Hello {name}\". Say \"Look, it's {name}...\" or \"Your friend {name} is here...\".\n\
         Keep it warm and short (1 sentence).",
        bio = identity.bio,
    )
}

pub fn summary_prompt(identity: &str, transcript: &str) -> String {
    format!(
        "Analyze this conversation transcript.\n\
         Speaker: {identity}\n\
         Transcript: \"{transcript}\"\n\n\
         1. Use the provided transcript as the ground truth.\n\
         2. Detect the primary emotion.\n\
         3. Summarize what was said in 2 sentences.\n\
         4. List up to 5 short topical tags (people, pets, places, events)."
    )
}

/// `data:` URL for frames a multimodal model can read directly.
fn image_data_url(frame: &CameraFrame) -> Option<String> {
    let mime = frame.format.mime_type()?;
    if frame.is_empty() {
        return None;
    }
    Some(format!("data:{mime};base64,{}", STANDARD.encode(&frame.data)))
}

fn greeting_messages(request: &GreetingRequest) -> Vec<ChatMessage> {
    let prompt = greeting_prompt(&request.identity);
    let content = match request.frame.as_ref().and_then(image_data_url) {
        Some(url) => MessageContent::Parts(vec![
            ContentPart::Text { text: prompt },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]),
        None => MessageContent::Text(prompt),
    };
    vec![ChatMessage {
        role: Role::User,
        content,
    }]
}

/// Parse model output into a [`Consolidation`], tolerating a Markdown code
/// fence around the JSON.
pub fn parse_consolidation(raw: &str) -> Result<Consolidation, LlmError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(body.trim())?)
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and share; the inner `reqwest::Client` pools connections.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a new driver pointing at `base_url` (e.g. `"http://localhost:11434"`)
    /// and using `model` (e.g. `"llama3"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send a bearer token with every request (hosted endpoints).
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` to the model and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        response_format: Option<ResponseFormat>,
    ) -> Result<String, LlmError> {
        let augmented = with_guidelines(messages);
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: &augmented,
            stream: false,
            response_format,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.as_text())
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

#[async_trait]
impl LanguageModel for LlmDriver {
    async fn greet(&self, request: GreetingRequest) -> Result<String, ReminisceError> {
        let reply = self.complete(&greeting_messages(&request), None).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::BadResponse("empty greeting".into()).into());
        }
        debug!(identity = %request.identity.name, "greeting generated");
        Ok(reply.to_string())
    }

    async fn summarize(&self, identity: &str, transcript: &str) -> Result<Consolidation, ReminisceError> {
        let messages = [ChatMessage::text(Role::User, summary_prompt(identity, transcript))];
        let raw = self
            .complete(&messages, Some(ResponseFormat::consolidation()))
            .await?;
        Ok(parse_consolidation(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminisce_hal::PixelFormat;
    use reminisce_types::{Emotion, MemoryEntry};

    fn ana() -> Identity {
        Identity {
            name: "Ana".into(),
            bio: "Your daughter, a nurse".into(),
            contact: None,
            embedding: vec![],
            history: vec![
                MemoryEntry::new("Initial Bio: Your daughter", Emotion::Neutral, ""),
                MemoryEntry::new("Ana talked about her new puppy.", Emotion::Excited, ""),
            ],
            tags: vec![],
        }
    }

    #[test]
    fn chat_message_serializes_role() {
        let json = serde_json::to_string(&ChatMessage::text(Role::System, "hello")).unwrap();
        assert!(json.contains("\"system\""));
        assert!(json.contains("\"hello\""));
    }

    #[test]
    fn text_response_deserializes() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"Look, it's Ana."}"#).unwrap();
        assert_eq!(msg.content.as_text(), "Look, it's Ana.");
    }

    #[test]
    fn guidelines_are_appended_or_prepended() {
        let with_sys = with_guidelines(&[ChatMessage::text(Role::System, "Be kind.")]);
        let text = with_sys[0].content.as_text();
        assert!(text.starts_with("Be kind."));
        assert!(text.contains("Care Guidelines"));

        let without = with_guidelines(&[ChatMessage::text(Role::User, "hi")]);
        assert_eq!(without.len(), 2);
        assert_eq!(without[0].role, Role::System);
    }

    #[test]
    fn greeting_prompt_mentions_mood_bio_and_recent_memory() {
        let p = greeting_prompt(&ana());
        assert!(p.contains("You see Ana in the camera."));
        assert!(p.contains("was feeling Excited last time"));
        assert!(p.contains("a nurse"));
        assert!(p.contains("new puppy"));
    }

    #[test]
    fn jpeg_frame_is_attached_as_image_part() {
        let request = GreetingRequest {
            identity: ana(),
            frame: Some(CameraFrame {
                width: 1,
                height: 1,
                format: PixelFormat::Jpeg,
                data: vec![0xff, 0xd8, 0xff],
            }),
        };
        let json = serde_json::to_string(&greeting_messages(&request)).unwrap();
        assert!(json.contains("\"image_url\""));
        assert!(json.contains("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn raw_frames_are_not_attached() {
        let request = GreetingRequest {
            identity: ana(),
            frame: Some(CameraFrame {
                width: 1,
                height: 1,
                format: PixelFormat::Gray8,
                data: vec![1],
            }),
        };
        let msgs = greeting_messages(&request);
        assert!(matches!(msgs[0].content, MessageContent::Text(_)));
    }

    #[test]
    fn consolidation_schema_is_wrapped_for_response_format() {
        let json = serde_json::to_value(ResponseFormat::consolidation()).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "consolidation");
        assert!(json["json_schema"]["schema"].to_string().contains("Excited"));
    }

    #[test]
    fn parse_consolidation_accepts_fenced_json() {
        let raw = "```json\n{\"summary\":\"They baked bread.\",\"emotion\":\"Happy\",\"tags\":[\"bread\"]}\n```";
        let c = parse_consolidation(raw).unwrap();
        assert_eq!(c.emotion, Emotion::Happy);
        assert_eq!(c.tags, vec!["bread".to_string()]);
        assert!(matches!(parse_consolidation("not json"), Err(LlmError::Json(_))));
    }

    #[test]
    fn llm_error_maps_to_provider_error() {
        let err: ReminisceError = LlmError::BadResponse("empty".into()).into();
        assert!(matches!(err, ReminisceError::Provider { .. }));
    }
}
