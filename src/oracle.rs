//! # Macro Oracle Module
//!
//! Client for the Gemini `generateContent` endpoint. Food descriptions and
//! nutrition label photos go in, a [`MacroEstimate`] comes out.
//!
//! Requests are retried with exponential backoff plus random jitter, each
//! attempt is bounded by a timeout, and a [`CircuitBreaker`] fails fast while
//! the service is down.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{OracleConfig, RecoveryConfig};
use crate::errors::OracleError;
use crate::meal::MacroEstimate;

const RESPONSE_FORMAT: &str = r#"Required JSON format (respond with this format only):
{
  "protein_g": <number>,
  "carbs_g": <number>,
  "fats_g": <number>,
  "calories": <number>,
  "parsed_food_item": "<string describing the food as you understood it>"
}"#;

/// Prompt for a free-text food description
pub fn text_prompt(description: &str) -> String {
    format!(
        "You are a nutrition expert. Estimate the macronutrients of the food described below.\n\n\
         IMPORTANT: Respond ONLY with a valid JSON object in the exact format specified below. \
         Do not include any additional text, markdown formatting, or explanations.\n\n\
         If quantities are not specified, assume reasonable serving sizes. \
         If you cannot identify the food, return zeros.\n\n\
         {RESPONSE_FORMAT}\n\n\
         Example:\n\
         Input: \"100g chicken breast\"\n\
         Output: {{\"protein_g\": 31, \"carbs_g\": 0, \"fats_g\": 3.6, \"calories\": 165, \"parsed_food_item\": \"100g chicken breast\"}}\n\n\
         Now analyze: \"{description}\""
    )
}

/// Prompt for a nutrition label photo with an optional weight caption
pub fn image_prompt(weight_hint: &str) -> String {
    format!(
        "You are a nutrition expert. Read the nutrition label in the image and calculate the \
         macronutrients for the weight given below.\n\n\
         IMPORTANT: Respond ONLY with a valid JSON object in the exact format specified below. \
         Do not include any additional text, markdown formatting, or explanations.\n\n\
         Weight: \"{weight_hint}\"\n\n\
         If no weight is given, assume one serving as printed on the label. \
         If you cannot read the label, return zeros.\n\n\
         {RESPONSE_FORMAT}\n\n\
         Example:\n\
         Input: a frozen pizza label stating 100g has 20g protein, 30g carbs, 10g fats, 500kcal, weight 50g\n\
         Output: {{\"protein_g\": 10, \"carbs_g\": 15, \"fats_g\": 5, \"calories\": 250, \"parsed_food_item\": \"Frozen pizza (50g)\"}}"
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Pull the nutrition JSON object out of a model reply
///
/// Tolerates code fences and stray prose around the object. Negative or
/// non-finite amounts are clamped to zero.
pub fn parse_estimate(reply: &str) -> Result<MacroEstimate, OracleError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(OracleError::InvalidResponse(
                "no JSON object in reply".to_string(),
            ))
        }
    };

    let mut estimate: MacroEstimate = serde_json::from_str(json)
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

    for value in [
        &mut estimate.protein_g,
        &mut estimate.carbs_g,
        &mut estimate.fats_g,
        &mut estimate.calories,
    ] {
        if !value.is_finite() || *value < 0.0 {
            *value = 0.0;
        }
    }
    estimate.parsed_food_item = estimate.parsed_food_item.trim().to_string();

    Ok(estimate)
}

/// Backoff before retry number `attempt` (zero-based), with jitter
pub fn retry_delay(recovery: &RecoveryConfig, attempt: u32) -> Duration {
    let exponential = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << attempt.min(16));
    let capped = exponential.min(recovery.max_retry_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=recovery.base_retry_delay_ms / 2);
    Duration::from_millis(capped + jitter)
}

/// Gemini-backed macro estimator
pub struct MacroOracle {
    client: reqwest::Client,
    config: OracleConfig,
    breaker: CircuitBreaker,
}

impl MacroOracle {
    pub fn new(config: OracleConfig) -> Self {
        let breaker = CircuitBreaker::new(&config.recovery);
        Self {
            client: reqwest::Client::new(),
            config,
            breaker,
        }
    }

    /// Estimate macros for a free-text description
    pub async fn estimate_text(&self, description: &str) -> Result<MacroEstimate, OracleError> {
        debug!(description_length = description.len(), "Requesting text macro estimate");
        let parts = vec![Part {
            text: Some(text_prompt(description)),
            inline_data: None,
        }];
        self.generate(parts).await
    }

    /// Estimate macros from a JPEG photo of a nutrition label
    pub async fn estimate_image(
        &self,
        jpeg: &[u8],
        weight_hint: &str,
    ) -> Result<MacroEstimate, OracleError> {
        debug!(image_bytes = jpeg.len(), "Requesting image macro estimate");
        let parts = vec![
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: BASE64.encode(jpeg),
                }),
            },
            Part {
                text: Some(image_prompt(weight_hint)),
                inline_data: None,
            },
        ];
        self.generate(parts).await
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<MacroEstimate, OracleError> {
        if self.breaker.is_open() {
            warn!("Oracle circuit breaker open, rejecting request");
            return Err(OracleError::CircuitOpen);
        }

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };

        let recovery = &self.config.recovery;
        let mut attempt = 0;
        loop {
            match self.request_once(&request).await {
                Ok(estimate) => {
                    self.breaker.record_success();
                    info!(
                        attempt,
                        food = %estimate.parsed_food_item,
                        calories = estimate.calories,
                        "Oracle estimate received"
                    );
                    return Ok(estimate);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    if attempt >= recovery.max_retries || self.breaker.is_open() {
                        error!(attempt, error = %e, "Oracle request failed, giving up");
                        return Err(e);
                    }
                    let delay = retry_delay(recovery, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Oracle request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn request_once(&self, request: &GenerateRequest) -> Result<MacroEstimate, OracleError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let timeout_secs = self.config.recovery.operation_timeout_secs;

        let call = async {
            let response = self
                .client
                .post(&url)
                .query(&[("key", self.config.api_key.as_str())])
                .json(request)
                .send()
                .await?
                .error_for_status()?;
            let body: GenerateResponse = response.json().await?;
            Ok::<_, OracleError>(body)
        };

        let body = tokio::time::timeout(Duration::from_secs(timeout_secs), call)
            .await
            .map_err(|_| OracleError::Timeout(timeout_secs))??;

        let reply: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(OracleError::InvalidResponse("empty candidate".to_string()));
        }
        parse_estimate(&reply)
    }
}
