use crate::error::{NlqError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant. Keep your answers short and succinct.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTurn {
    pub role: Role,
    pub text: String,
}

impl GenerationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    /// Not part of the OpenAI chat schema; only sent when configured.
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_k: None,
            max_tokens: None,
        }
    }
}

/// Ordered turns (oldest first) plus the instruction and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub turns: Vec<GenerationTurn>,
    pub system: Option<String>,
    pub sampling: SamplingParams,
}

impl GenerationRequest {
    /// Prior turns followed by one new user turn.
    pub fn new(prior: &[GenerationTurn], prompt: impl Into<String>) -> Self {
        let mut turns = prior.to_vec();
        turns.push(GenerationTurn::user(prompt));
        Self {
            turns,
            system: None,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Text of the newest user turn.
    pub fn prompt(&self) -> &str {
        self.turns.last().map(|t| t.text.as_str()).unwrap_or_default()
    }
}

/// Text-generation service boundary. Stateless per call.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub sampling: SamplingParams,
    pub system_instruction: String,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| NlqError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let mut sampling = SamplingParams::default();
        if let Ok(raw) = std::env::var("LLM_TEMPERATURE") {
            sampling.temperature = raw
                .parse()
                .map_err(|_| NlqError::Config(format!("invalid LLM_TEMPERATURE: {}", raw)))?;
        }
        if let Ok(raw) = std::env::var("LLM_TOP_K") {
            sampling.top_k = Some(
                raw.parse()
                    .map_err(|_| NlqError::Config(format!("invalid LLM_TOP_K: {}", raw)))?,
            );
        }

        Ok(Self {
            api_key,
            base_url,
            model,
            sampling,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        })
    }
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NlqError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        )
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for turn in &request.turns {
            messages.push(serde_json::json!({"role": turn.role, "content": turn.text}));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.sampling.temperature,
        });
        if let Some(top_k) = request.sampling.top_k {
            body["top_k"] = serde_json::json!(top_k);
        }
        if let Some(max_tokens) = request.sampling.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.request_body(request);
        debug!("LLM request with {} turns", request.turns.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NlqError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| NlqError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let answer = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NlqError::Llm("LLM response had no content".to_string()))?;

        info!("LLM output: {}", answer);
        Ok(answer)
    }
}
