//! Language-model backend: a one-method trait and the Gemini `generateContent` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured (set llm.api_key or GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(#[from] ureq::Error),

    #[error("decoding response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that turns a prompt into reply text.
pub trait LanguageModel {
    /// An empty string means the model produced no text.
    fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Text of the first part of the first candidate, or empty.
fn first_candidate_text(body: &str) -> Result<String, LlmError> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    Ok(response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .unwrap_or_default())
}

/// Blocking Gemini client. One request per call, no retries.
pub struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let payload = serde_json::to_string(&GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        })?;
        let body = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", key)
            .send(payload.as_str())?
            .into_body()
            .read_to_string()?;
        first_candidate_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Olá! *Como* posso ajudar?"}, {"text": "ignored"}], "role": "model"}},
                {"content": {"parts": [{"text": "second candidate"}]}}
            ],
            "usageMetadata": {"totalTokenCount": 12}
        }"#;
        assert_eq!(first_candidate_text(body).unwrap(), "Olá! *Como* posso ajudar?");
    }

    #[test]
    fn missing_candidates_yield_empty_text() {
        assert_eq!(first_candidate_text("{}").unwrap(), "");
        assert_eq!(first_candidate_text(r#"{"candidates": []}"#).unwrap(), "");
        assert_eq!(
            first_candidate_text(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        assert!(matches!(first_candidate_text("<html>"), Err(LlmError::Decode(_))));
    }

    #[test]
    fn request_body_shape() {
        let json = serde_json::to_value(GenerateRequest {
            contents: [Content {
                parts: [Part { text: "hello" }],
            }],
        })
        .unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let config = LlmConfig {
            base_url: "https://example.test/v1beta/".into(),
            model: "gemini-2.0-flash".into(),
            ..LlmConfig::default()
        };
        let client = GeminiClient::new(&config, None);
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn missing_key_fails_without_network() {
        let client = GeminiClient::new(&LlmConfig::default(), None);
        assert!(matches!(client.generate("hi"), Err(LlmError::MissingApiKey)));
    }
}
