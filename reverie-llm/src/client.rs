//! LLM Client — a single HTTP attempt against Ollama or an
//! OpenAI-compatible backend.
//!
//! Retrying is the service's job; the client only classifies failures.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use reverie_core::config::LlmConfig;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse, EmbeddingResponse, Usage};

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; every call fails with [`LlmError::NoProvider`].
    None,
}

impl LlmProvider {
    /// Resolve the provider from configuration, reading the API key from
    /// the environment variable named by `api_key_env`.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an unknown provider name or a missing key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        match config.provider.as_str() {
            "none" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    LlmError::ConfigError(format!("environment variable {} is not set", config.api_key_env))
                })?;
                Ok(Self::OpenAiCompatible { base_url, api_key })
            }
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }
}

/// The operations the retrying service needs from a backend.
pub trait LlmBackend: Send + Sync {
    /// One chat completion attempt.
    fn chat(&self, request: &ChatRequest) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;

    /// One embedding attempt.
    fn embed(&self, model: &str, text: &str) -> impl Future<Output = Result<EmbeddingResponse, LlmError>> + Send;
}

/// HTTP client routing requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
}

impl LlmClient {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(provider: LlmProvider, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;
        Ok(Self { provider, http })
    }

    /// Build from configuration.
    ///
    /// # Errors
    /// See [`LlmProvider::from_config`] and [`Self::new`].
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(
            LlmProvider::from_config(config)?,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    async fn post(&self, url: &str, api_key: Option<&str>, body: &Value) -> Result<Value, LlmError> {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

async fn checked(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "LLM backend returned error");
    Err(LlmError::Http {
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    })
}

impl LlmBackend for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let (text, usage) = match &self.provider {
            LlmProvider::None => return Err(LlmError::NoProvider),
            LlmProvider::Ollama { base_url } => {
                let body = json!({
                    "model": request.model,
                    "messages": request.messages,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                parse_ollama_chat(&self.post(&format!("{base_url}/api/chat"), None, &body).await?)?
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = serde_json::to_value(request).map_err(|e| LlmError::RequestFailed(e.to_string()))?;
                parse_openai_chat(
                    &self
                        .post(&format!("{base_url}/v1/chat/completions"), Some(api_key), &body)
                        .await?,
                )?
            }
        };
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(model = %request.model, latency_ms, tokens = usage.completion_tokens, "Chat completion");
        Ok(ChatResponse {
            text,
            usage,
            latency_ms,
            model: request.model.clone(),
        })
    }

    async fn embed(&self, model: &str, text: &str) -> Result<EmbeddingResponse, LlmError> {
        let (vector, usage) = match &self.provider {
            LlmProvider::None => return Err(LlmError::NoProvider),
            LlmProvider::Ollama { base_url } => {
                let body = json!({ "model": model, "prompt": text });
                parse_ollama_embedding(&self.post(&format!("{base_url}/api/embeddings"), None, &body).await?)?
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({ "model": model, "input": text });
                parse_openai_embedding(
                    &self
                        .post(&format!("{base_url}/v1/embeddings"), Some(api_key), &body)
                        .await?,
                )?
            }
        };
        Ok(EmbeddingResponse {
            vector,
            usage,
            model: model.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn missing(what: &str) -> LlmError {
    LlmError::ParseError(format!("response has no {what}"))
}

fn usage_from(value: &Value) -> Usage {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn token_count(value: &Value) -> u32 {
    value.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
}

fn vector_from(value: &Value) -> Result<Vec<f32>, LlmError> {
    serde_json::from_value(value.clone()).map_err(|e| LlmError::ParseError(e.to_string()))
}

fn parse_openai_chat(json: &Value) -> Result<(String, Usage), LlmError> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| missing("choices[0].message.content"))?;
    Ok((text.to_string(), usage_from(&json["usage"])))
}

fn parse_ollama_chat(json: &Value) -> Result<(String, Usage), LlmError> {
    let text = json["message"]["content"]
        .as_str()
        .ok_or_else(|| missing("message.content"))?;
    let usage = Usage {
        prompt_tokens: token_count(&json["prompt_eval_count"]),
        completion_tokens: token_count(&json["eval_count"]),
    };
    Ok((text.to_string(), usage))
}

fn parse_openai_embedding(json: &Value) -> Result<(Vec<f32>, Usage), LlmError> {
    let data = &json["data"][0]["embedding"];
    if data.is_null() {
        return Err(missing("data[0].embedding"));
    }
    Ok((vector_from(data)?, usage_from(&json["usage"])))
}

fn parse_ollama_embedding(json: &Value) -> Result<(Vec<f32>, Usage), LlmError> {
    let data = &json["embedding"];
    if data.is_null() {
        return Err(missing("embedding"));
    }
    Ok((vector_from(data)?, Usage::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn openai_chat_shape() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "5" } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 1, "total_tokens": 121 }
        });
        let (text, usage) = parse_openai_chat(&json).expect("parse");
        assert_eq!(text, "5");
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.completion_tokens, 1);
    }

    #[test]
    fn ollama_chat_shape() {
        let json = json!({
            "message": { "role": "assistant", "content": "sleeping" },
            "prompt_eval_count": 30,
            "eval_count": 4
        });
        let (text, usage) = parse_ollama_chat(&json).expect("parse");
        assert_eq!(text, "sleeping");
        assert_eq!(usage, Usage { prompt_tokens: 30, completion_tokens: 4 });
    }

    #[test]
    fn embedding_shapes() {
        let openai = json!({ "data": [{ "embedding": [0.5, -0.25] }], "usage": { "prompt_tokens": 3 } });
        let (vector, usage) = parse_openai_embedding(&openai).expect("parse");
        assert_eq!(vector, vec![0.5, -0.25]);
        assert_eq!(usage.prompt_tokens, 3);

        let ollama = json!({ "embedding": [1.0, 0.0, 0.0] });
        assert_eq!(parse_ollama_embedding(&ollama).expect("parse").0.len(), 3);
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        assert!(matches!(parse_openai_chat(&json!({})), Err(LlmError::ParseError(_))));
        assert!(matches!(parse_ollama_embedding(&json!({ "embedding": "nope" })), Err(LlmError::ParseError(_))));
    }

    #[test]
    fn provider_from_config() {
        let mut config = LlmConfig::default();
        assert!(matches!(LlmProvider::from_config(&config), Ok(LlmProvider::None)));

        config.provider = "ollama".into();
        config.base_url = "http://localhost:11434/".into();
        match LlmProvider::from_config(&config) {
            Ok(LlmProvider::Ollama { base_url }) => assert_eq!(base_url, "http://localhost:11434"),
            other => panic!("unexpected {other:?}"),
        }

        config.provider = "openai".into();
        config.api_key_env = "REVERIE_TEST_KEY_THAT_IS_NOT_SET".into();
        assert!(matches!(LlmProvider::from_config(&config), Err(LlmError::ConfigError(_))));

        config.provider = "llamacpp".into();
        assert!(LlmProvider::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn no_provider_fails_fast() {
        let client = LlmClient::new(LlmProvider::None, Duration::from_secs(1)).expect("client");
        assert!(!client.is_available());
        let request = ChatRequest::new("gpt-3.5-turbo", vec![ChatMessage::user("hi")]);
        assert!(matches!(client.chat(&request).await, Err(LlmError::NoProvider)));
        assert!(matches!(client.embed("m", "text").await, Err(LlmError::NoProvider)));
    }
}
