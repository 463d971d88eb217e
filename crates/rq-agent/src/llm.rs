//! Uniform call surface over chat models.
//!
//! Callers hand the gateway a model id, per-call credentials, and messages;
//! they get back a full reply or a typed object conforming to a JSON
//! schema. The production backend is the Gemini `generateContent` API.

use std::time::Duration;

use async_trait::async_trait;
use rq_core::{ChatRole, ChatTurn, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model_id: String,
    pub api_key: String,
    pub messages: Vec<ChatTurn>,
    /// When set, the reply must be a JSON document matching this schema.
    pub response_schema: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl ChatRequest {
    pub fn new(
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        messages: Vec<ChatTurn>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            messages,
            response_schema: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Trait for chat-model backends.
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    /// Run one completion and return the reply text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Complete and deserialize a structured reply, recovering from replies
/// that wrap the JSON in prose or code fences.
pub async fn complete_structured<T: DeserializeOwned>(
    model: &dyn ChatModel,
    request: ChatRequest,
) -> Result<T> {
    let text = model.complete(request).await?;
    parse_structured(&text)
}

/// Parse a structured reply: direct parse first, then the first `{…}`
/// substring.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    if let Some(candidate) = extract_json_object(text) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }
    Err(rq_core::Error::Parse(format!(
        "model reply is not valid structured output: {}",
        text.chars().take(200).collect::<String>()
    )))
}

/// Locate the outermost `{…}` substring of a reply.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// ── Gemini backend ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

/// Gemini chat backend. Stateless: model id and key travel with each call.
pub struct GeminiChat {
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// Code questions hit safety filters on innocuous content (security
    /// code, exception handlers), so every category is relaxed.
    fn safety_settings() -> Vec<GeminiSafetySetting> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| GeminiSafetySetting { category, threshold: "BLOCK_NONE" })
        .collect()
    }

    fn convert_messages(
        messages: &[ChatTurn],
    ) -> (Option<GeminiSystemInstruction>, Vec<GeminiContent>) {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for turn in messages {
            match turn.role {
                ChatRole::System => {
                    system_parts.push(GeminiPart { text: turn.content.clone() });
                }
                ChatRole::User => contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart { text: turn.content.clone() }],
                }),
                ChatRole::Llm => contents.push(GeminiContent {
                    role: "model".to_string(),
                    parts: vec![GeminiPart { text: turn.content.clone() }],
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(GeminiSystemInstruction { parts: system_parts })
        };
        (system, contents)
    }
}

impl Default for GeminiChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        if request.api_key.is_empty() {
            return Err(rq_core::Error::NotConfigured("LLM API key is empty".into()));
        }

        let (system_instruction, contents) = Self::convert_messages(&request.messages);
        let body = GeminiRequest {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature: 0.0,
                response_mime_type: request
                    .response_schema
                    .is_some()
                    .then(|| "application/json".to_string()),
                response_schema: request.response_schema.clone(),
            },
            safety_settings: Self::safety_settings(),
        };

        let url = format!("{API_BASE}/models/{}:generateContent", request.model_id);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &request.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => rq_core::Error::NotConfigured(format!(
                    "model provider rejected credentials ({status})"
                )),
                408 | 504 => rq_core::Error::UpstreamTimeout(format!("model provider: {status}")),
                _ => rq_core::Error::UpstreamUnavailable(format!("model provider: {status}")),
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("model reply decode: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> rq_core::Error {
    if err.is_timeout() {
        rq_core::Error::UpstreamTimeout(format!("model request: {err}"))
    } else {
        rq_core::Error::UpstreamUnavailable(format!("model request: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Planned {
        decomposed_query: String,
        plan: Vec<String>,
    }

    #[test]
    fn parse_structured_accepts_clean_json() {
        let parsed: Planned =
            parse_structured(r#"{"decomposed_query": "q", "plan": ["step"]}"#).unwrap();
        assert_eq!(parsed.plan, vec!["step"]);
    }

    #[test]
    fn parse_structured_recovers_wrapped_json() {
        let reply = "Sure! Here is the plan:\n```json\n{\"decomposed_query\": \"q\", \"plan\": []}\n```\nDone.";
        let parsed: Planned = parse_structured(reply).unwrap();
        assert_eq!(parsed.decomposed_query, "q");
        assert!(parsed.plan.is_empty());
    }

    #[test]
    fn parse_structured_rejects_garbage() {
        let result: Result<Planned> = parse_structured("no json here");
        assert!(matches!(result, Err(rq_core::Error::Parse(_))));
    }

    #[test]
    fn extract_json_object_finds_outermost_braces() {
        assert_eq!(extract_json_object("x {\"a\": {\"b\": 1}} y"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("nothing"), None);
        assert_eq!(extract_json_object("} reversed {"), None);
    }
}
