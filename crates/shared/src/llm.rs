use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{check_status, Error, Result};
use crate::retry::RetryPolicy;

const SERVICE: &str = "Gemini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Generation parameters for one call
#[derive(Debug, Clone, Copy)]
pub struct Generation {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Generation {
    /// Short, focused answers (topics, indices, JSON briefs)
    pub const RESEARCH: Self = Self {
        temperature: 0.4,
        max_output_tokens: 4096,
    };

    /// Long-form drafting
    pub const DRAFT: Self = Self {
        temperature: 0.8,
        max_output_tokens: 16384,
    };
}

#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generated text, never empty.
    async fn generate(&self, prompt: &str, params: Generation) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::transport(SERVICE))?;

        Ok(Self {
            client,
            api_key,
            model,
            retry: RetryPolicy::text_model(),
        })
    }

    async fn try_generate(&self, prompt: &str, params: Generation) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::transport(SERVICE))?;

        let response = check_status(SERVICE, response).await?;
        let body = response.text().await.map_err(Error::transport(SERVICE))?;
        extract_text(&body)
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(&self, prompt: &str, params: Generation) -> Result<String> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");
        let text = self
            .retry
            .run("gemini.generate", |_| self.try_generate(prompt, params))
            .await?;
        tracing::debug!(response_chars = text.len(), "Gemini responded");
        Ok(text)
    }
}

fn extract_text(body: &str) -> Result<String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| Error::malformed(SERVICE, e))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::EmptyResponse { service: SERVICE });
    }
    Ok(text)
}

/// Strip a ```lang ... ``` fence wrapping the whole reply, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// First `{...}` or `[...]` span in a reply, for models that wrap JSON in prose
pub fn json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
