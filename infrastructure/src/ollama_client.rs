use async_trait::async_trait;
use domain::ports::Generator;
use domain::prompt::{Message, Prompt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::types::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

/// HTTP client for an Ollama server: chat generation and embeddings.
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_embedding(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model,
            prompt: text,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("embedding request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            warn!(model, %status, "embedding request rejected");
            return Err(Error::embedding(format!("Ollama returned {status}: {body}")));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("malformed embedding response: {e}")))?;
        Ok(parsed.embedding)
    }

    pub async fn generate_response(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, model = %self.model, "sending chat request");
        let messages = prompt.messages();
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("chat request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::generation(format!("failed reading chat response: {e}")))?;
        if !status.is_success() {
            warn!(model = %self.model, %status, "chat request rejected");
            return Err(Error::generation(format!("Ollama API error ({status}): {text}")));
        }
        debug!(model = %self.model, bytes = text.len(), "chat response received");
        collect_chat_content(&text)
    }
}

/// Joins message content across NDJSON lines; a non-streamed reply is a
/// single line.
fn collect_chat_content(body: &str) -> Result<String> {
    let mut full_content = String::new();
    let mut saw_message = false;
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(chat_resp) = serde_json::from_str::<ChatResponse>(line) {
            saw_message = true;
            full_content.push_str(&chat_resp.message.content);
            if chat_resp.done {
                break;
            }
        }
    }
    if !saw_message {
        return Err(Error::generation("chat response contained no message"));
    }
    Ok(full_content)
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.generate_response(prompt).await
    }
}
