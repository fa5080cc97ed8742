//! Chat assistant proxy. The conversation is flattened into a single prompt
//! behind a fixed system instruction and handed to a [`CompletionClient`].

pub mod models;
pub mod routes;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::assistant::models::{ChatMessage, ChatRole};

pub const SYSTEM_INSTRUCTION: &str = "You are Apex Tech's helpful AI assistant. You help students \
understand Data Science, internships, major projects, tech career pathways, and details about \
Apex Tech programs. Your responses should be simple, clear, friendly, and helpful.";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("completion response had no text")]
    EmptyResponse,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError>;
}

/// Renders the conversation as `User:` / `Assistant:` lines and leaves the
/// prompt open for the assistant's turn.
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    let history = messages
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("User: {}", m.content),
            ChatRole::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{SYSTEM_INSTRUCTION}\n\n{history}\n\nAssistant:")
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

impl GeminiClient {
    /// The key travels in a header so it never appears in URLs or in
    /// `reqwest::Error` messages.
    fn generate_request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        self.client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_str())
            .header("Accept", "application/json")
            .json(&payload)
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        let resp = self.generate_request(prompt).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AssistantError::Status(status));
        }

        let body: GenerateResponse = resp.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(AssistantError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_renders_turns_after_instruction() {
        let prompt = build_prompt(&[
            ChatMessage {
                role: ChatRole::User,
                content: "What is pandas?".into(),
            },
            ChatMessage {
                role: ChatRole::Assistant,
                content: "A Python library.".into(),
            },
        ]);

        assert!(prompt.starts_with(SYSTEM_INSTRUCTION));
        assert!(prompt.ends_with(
            "\n\nUser: What is pandas?\nAssistant: A Python library.\n\nAssistant:"
        ));
    }

    #[test]
    fn api_key_is_sent_as_header_not_query() {
        let client =
            GeminiClient::new("secret-key", "gemini-pro", Duration::from_secs(5)).unwrap();
        let request = client.generate_request("hello").build().unwrap();

        assert_eq!(request.url().query(), None);
        assert!(!request.url().as_str().contains("secret-key"));
        assert!(request.url().path().ends_with("/gemini-pro:generateContent"));
        assert_eq!(request.headers()["x-goog-api-key"], "secret-key");
    }
}
