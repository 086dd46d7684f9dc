//! Generation provider abstraction and implementations.
//!
//! Defines the [`Generator`] trait and concrete backends:
//! - **[`DisabledGenerator`]** — returns errors; used when generation is not configured.
//! - **[`GeminiGenerator`]** — Google Generative Language `generateContent` API.
//! - **[`OpenAiGenerator`]** — OpenAI chat completions API.
//!
//! A generator receives the conversation turns (oldest first, ending with
//! the current question) and optionally a set of retrieved passages to
//! ground the answer in. Output is non-deterministic; callers must not
//! compare generated text for equality.
//!
//! Remote backends share the retry/backoff policy of the embedding layer.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::embedding::{gemini_api_key, post_json_with_retry};
use crate::error::{Error, Result};
use crate::models::{ConversationTurn, Role};

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Generate an answer for the given conversation, optionally grounded
    /// in retrieved passages.
    async fn generate(&self, turns: &[ConversationTurn], passages: &[String]) -> Result<String>;
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        other => Err(Error::Generation(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// Instruction prepended when retrieved passages accompany a question.
fn grounding_instruction(passages: &[String]) -> String {
    let mut out = String::from(
        "Answer using the passages below, which were retrieved from the \
         user's documents. If they do not contain the answer, say so.\n",
    );
    for passage in passages {
        out.push('\n');
        out.push_str(passage);
    }
    out
}

// ============ Disabled ============

/// A no-op generator that always returns errors.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _turns: &[ConversationTurn], _passages: &[String]) -> Result<String> {
        Err(Error::Generation(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ Gemini ============

/// Generation backend for the Google Generative Language API.
///
/// Calls `POST /v1beta/models/{model}:generateContent`. Requires
/// `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) in the environment.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
    config: GenerationConfig,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::Generation("generation.model required for Gemini provider".to_string())
        })?;
        let api_key = gemini_api_key().ok_or_else(|| {
            Error::Generation("GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Generation(e.to_string()))?;

        Ok(Self {
            model,
            api_key,
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, turns: &[ConversationTurn], passages: &[String]) -> Result<String> {
        let contents: Vec<serde_json::Value> = turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": turn.content }],
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "topP": self.config.top_p,
                "topK": self.config.top_k,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        });
        if !passages.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": grounding_instruction(passages) }],
            });
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let json = post_json_with_retry(request, self.config.max_retries)
            .await
            .map_err(Error::Generation)?;

        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| Error::Generation("no candidates in response".to_string()))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(Error::Generation("empty candidate text".to_string()));
        }
        Ok(text)
    }
}

// ============ OpenAI ============

/// Generation backend for the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
    config: GenerationConfig,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::Generation("generation.model required for OpenAI provider".to_string())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Generation("OPENAI_API_KEY not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Generation(e.to_string()))?;

        Ok(Self {
            model,
            api_key,
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, turns: &[ConversationTurn], passages: &[String]) -> Result<String> {
        let mut messages: Vec<serde_json::Value> = Vec::with_capacity(turns.len() + 1);
        if !passages.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": grounding_instruction(passages),
            }));
        }
        for turn in turns {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": turn.content }));
        }

        let request = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "max_tokens": self.config.max_output_tokens,
            }));

        let json = post_json_with_retry(request, self.config.max_retries)
            .await
            .map_err(Error::Generation)?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Generation("no choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounding_instruction_includes_each_passage() {
        let passages = vec!["first passage".to_string(), "second passage".to_string()];
        let instruction = grounding_instruction(&passages);
        assert!(instruction.contains("first passage"));
        assert!(instruction.contains("second passage"));
    }

    #[tokio::test]
    async fn disabled_generator_rejects() {
        let err = DisabledGenerator
            .generate(&[ConversationTurn::user("hello")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
