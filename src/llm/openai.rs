use crate::http::build_client;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

// Extraction-style calls want deterministic output, not creative variation.
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 16384;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: std::env::var("OPENAI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    #[allow(dead_code)]
    pub usage: Option<LlmUsage>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One vision chat-completion: a system prompt, one inline JPEG (base64
    /// data URL at high detail) and a short user instruction.
    pub async fn chat_vision(
        &self,
        system_prompt: &str,
        user_text: &str,
        image_b64: &str,
    ) -> Result<LlmResponse, LlmError> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Parts(vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{image_b64}"),
                                detail: "high".into(),
                            },
                        },
                        ContentPart::Text {
                            text: user_text.to_string(),
                        },
                    ]),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".into()))?;

        Ok(LlmResponse {
            text,
            usage: payload.usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_key_is_rejected_before_any_network() {
        let client = LlmClient::new(LlmConfig::new("", "gpt-4o"));
        let err = client
            .chat_vision("system", "extract", "aGVsbG8=")
            .await
            .expect_err("must reject");
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn request_body_shape_matches_vision_api() {
        let body = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/jpeg;base64,QUJD".into(),
                        detail: "high".into(),
                    },
                }]),
            }],
            temperature: 0.2,
            max_tokens: 16384,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["messages"][0]["content"][0]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][0]["image_url"]["detail"],
            "high"
        );
        let temperature = json["temperature"].as_f64().expect("temperature");
        assert!((temperature - 0.2).abs() < 1e-6);
    }
}
