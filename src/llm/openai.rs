use crate::config::LlmConfig;
use crate::http::build_client;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Chat-completions client for any OpenAI-compatible endpoint.
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

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Prompt with an optional image attachment; the reply must be a single
    /// JSON object (fenced output tolerated).
    pub async fn vision_json(
        &self,
        system: &str,
        user_text: &str,
        image_url: Option<&str>,
    ) -> Result<Value, LlmError> {
        let mut parts = vec![ContentPart::Text {
            text: user_text.to_string(),
        }];
        if let Some(url) = image_url {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrlRef {
                    url: url.to_string(),
                },
            });
        }

        let body = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: Some(ResponseFormat {
                r#type: "json_object".into(),
            }),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Parts(parts),
                },
            ],
        };

        let text = self.complete(&body).await?;
        let cleaned = strip_markdown_fence(&text);
        serde_json::from_str(&cleaned).map_err(|err| LlmError::InvalidResponse(err.to_string()))
    }

    /// Plain-text completion, used for description condensation.
    pub async fn chat_text(&self, system: &str, user_text: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: None,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Text(user_text.to_string()),
                },
            ],
        };
        self.complete(&body).await
    }

    async fn complete(&self, body: &ChatRequest) -> Result<String, LlmError> {
        let key = self.config.api_key.as_deref().ok_or(LlmError::MissingKey)?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!("HTTP {status}: {detail}")));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        if let Some(usage) = &payload.usage {
            debug!(
                target: "rickhouse.llm",
                input = usage.prompt_tokens,
                output = usage.completion_tokens,
                model = %body.model,
                "completion finished"
            );
        }

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".into()))
    }
}

pub fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
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
    Text { text: String },
    ImageUrl { image_url: ImageUrlRef },
}

#[derive(Debug, Serialize)]
struct ImageUrlRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}
