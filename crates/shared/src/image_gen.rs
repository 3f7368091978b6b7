use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{check_status, Error, Result};
use crate::models::Topic;
use crate::retry::RetryPolicy;

const SERVICE: &str = "Together";
const TOGETHER_IMAGES_URL: &str = "https://api.together.xyz/v1/images/generations";

/// Requested size; the transformer crops to the final 16:9 frame
pub const REQUEST_WIDTH: u32 = 1024;
pub const REQUEST_HEIGHT: u32 = 576;

#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Raw encoded image bytes (PNG, JPEG or WebP).
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>>;
}

/// Featured image prompt for `topic`
pub fn image_prompt(topic: &Topic) -> String {
    format!(
        "A futuristic representation of {} in the world of cryptocurrency, digital art style, \
        high contrast, vibrant colors, blockchain background, intricate details, concept art, 8k",
        topic
    )
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    width: u32,
    height: u32,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug)]
enum ImagePayload {
    Inline(Vec<u8>),
    Remote(String),
}

pub struct TogetherClient {
    client: Client,
    download: Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl TogetherClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(Error::transport(SERVICE))?;
        let download = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::transport(SERVICE))?;

        Ok(Self {
            client,
            download,
            api_key,
            model,
            retry: RetryPolicy::image_model(),
        })
    }

    async fn try_generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let request = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            width: REQUEST_WIDTH,
            height: REQUEST_HEIGHT,
            response_format: "b64_json",
        };

        let response = self
            .client
            .post(TOGETHER_IMAGES_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::transport(SERVICE))?;

        let response = check_status(SERVICE, response).await?;
        let body = response.text().await.map_err(Error::transport(SERVICE))?;

        match parse_payload(&body)? {
            ImagePayload::Inline(bytes) => Ok(bytes),
            ImagePayload::Remote(url) => self.fetch(&url).await,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "Downloading generated image");
        let response = self
            .download
            .get(url)
            .send()
            .await
            .map_err(Error::transport(SERVICE))?;
        let response = check_status(SERVICE, response).await?;
        let bytes = response.bytes().await.map_err(Error::transport(SERVICE))?;
        if bytes.is_empty() {
            return Err(Error::EmptyResponse { service: SERVICE });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageModel for TogetherClient {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
        tracing::info!(model = %self.model, "Requesting featured image");
        let bytes = self
            .retry
            .run("together.images", |_| self.try_generate(prompt))
            .await?;
        tracing::info!(bytes = bytes.len(), "Received generated image");
        Ok(bytes)
    }
}

fn parse_payload(body: &str) -> Result<ImagePayload> {
    let parsed: ImageResponse =
        serde_json::from_str(body).map_err(|e| Error::malformed(SERVICE, e))?;

    let Some(first) = parsed.data.into_iter().next() else {
        return Err(Error::EmptyResponse { service: SERVICE });
    };

    if let Some(encoded) = first.b64_json.filter(|s| !s.is_empty()) {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::malformed(SERVICE, format!("invalid base64 image: {}", e)))?;
        return Ok(ImagePayload::Inline(bytes));
    }

    match first.url.filter(|u| !u.is_empty()) {
        Some(url) => Ok(ImagePayload::Remote(url)),
        None => Err(Error::malformed(SERVICE, "image entry has neither b64_json nor url")),
    }
}
