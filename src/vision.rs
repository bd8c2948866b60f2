use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::ledger::{clamp_estimate, FALLBACK_ESTIMATE_KCAL};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Instruction sent with every photo. The model is asked for a bare number.
pub const CALORIE_PROMPT: &str = "Analyze this food photo and estimate the total calories of \
all the food in it. Reply with a number only (in kcal), without any explanation or other \
text. Example: 450";

/// Something that can look at a meal photo and reply with text containing a
/// calorie estimate.
#[async_trait]
pub trait CalorieEstimator: Send + Sync {
    /// Raw text reply for a JPEG image.
    async fn analyze(&self, jpeg: &[u8]) -> Result<String>;
}

/// Ask the estimator about a photo and turn its reply into kcal.
pub async fn estimate_calories(estimator: &dyn CalorieEstimator, jpeg: &[u8]) -> Result<u32> {
    let text = estimator.analyze(jpeg).await?;
    let calories = parse_calorie_estimate(&text);
    debug!(calories, "parsed calorie estimate");
    Ok(calories)
}

/// First run of digits in the reply, clamped to the accepted range.
/// Replies without any digit get the fallback estimate.
pub fn parse_calorie_estimate(text: &str) -> u32 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        return FALLBACK_ESTIMATE_KCAL;
    }

    let raw = digits.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    });
    clamp_estimate(raw)
}

/// Google Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiEstimator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiEstimator {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CalorieEstimator for GeminiEstimator {
    async fn analyze(&self, jpeg: &[u8]) -> Result<String> {
        let Some(ref api_key) = self.api_key else {
            bail!("GEMINI_API_KEY is not configured");
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": CALORIE_PROMPT },
                    { "inline_data": { "mime_type": "image/jpeg", "data": STANDARD.encode(jpeg) } }
                ]
            }]
        });

        debug!(model = %self.model, bytes = jpeg.len(), "sending photo for calorie estimate");
        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let data: Value = resp.json().await.unwrap_or(Value::Null);
            let message = data["error"]["message"].as_str().unwrap_or("API Error");
            return Err(anyhow!("Gemini request failed: {} - {}", status, message));
        }

        let data: Value = resp
            .json()
            .await
            .context("Gemini returned an unreadable response")?;

        Ok(data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("0")
            .to_string())
    }
}
