//! HTTP generation backend for OpenAI-compatible chat-completion servers
//! (llama.cpp server, vLLM, Ollama's `/v1` endpoint, hosted APIs).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GenerationBackend;
use crate::config::GenerationConfig;
use crate::context::Prompt;
use crate::error::AdvisorError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl HttpBackend {
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            match std::env::var(&config.api_key_env) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    tracing::warn!(
                        var = %config.api_key_env,
                        "[Generation] API key variable not set, sending unauthenticated requests"
                    );
                    None
                }
            }
        };

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self) -> String {
        if self.endpoint.ends_with("/chat/completions") {
            self.endpoint.clone()
        } else {
            format!("{}/v1/chat/completions", self.endpoint)
        }
    }
}

/// Retry classification for non-success HTTP status codes
fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn transport_error(e: &reqwest::Error) -> AdvisorError {
    AdvisorError::GenerationError {
        message: format!("transport: {e}"),
        retryable: e.is_connect() || e.is_timeout() || e.is_request(),
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AdvisorError> {
        let user = prompt.user_message();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &user },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let mut request = self.http.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| transport_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(AdvisorError::GenerationError {
                message: format!("server returned {status}: {detail}"),
                retryable: status_is_retryable(status),
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| AdvisorError::GenerationError {
            message: format!("malformed completion: {e}"),
            retryable: false,
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AdvisorError::GenerationError {
                message: "completion contained no text".to_string(),
                retryable: false,
            })
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn retry_classification() {
        assert!(status_is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(status_is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(status_is_retryable(StatusCode::REQUEST_TIMEOUT));
        assert!(!status_is_retryable(StatusCode::BAD_REQUEST));
        assert!(!status_is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn url_appends_chat_path_once() {
        let mut config = GenerationConfig::default();
        config.endpoint = "http://127.0.0.1:8080/".to_string();
        config.api_key_env = String::new();
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(backend.url(), "http://127.0.0.1:8080/v1/chat/completions");

        config.endpoint = "http://host/v1/chat/completions".to_string();
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(backend.url(), "http://host/v1/chat/completions");
    }

    #[test]
    fn parses_completion_payload() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":" Gear down now. "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Gear down now. "));
    }
}
