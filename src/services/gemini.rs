// src/services/gemini.rs

//! Gemini-backed verdict generator.
//!
//! Sends the combined menu feed with a day-specific prompt to the
//! `generateContent` endpoint and accepts the reply only if it parses as a
//! [`DayVerdict`](crate::models::DayVerdict).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DayKey, GeminiConfig, PromptVariant, VerdictPayload};
use crate::services::VerdictGenerator;
use crate::utils::http::client_with_timeout;

/// Gemini API client producing day verdicts.
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    variant: PromptVariant,
    corrections_file: Option<PathBuf>,
}

impl GeminiGenerator {
    /// Create a generator. Fails when no API key is configured.
    pub fn new(config: &GeminiConfig, user_agent: &str) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::config("Missing GEMINI_API_KEY"))?;

        Ok(Self {
            client: client_with_timeout(user_agent, config.timeout_secs)?,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            variant: config.variant,
            corrections_file: config.corrections_file.clone(),
        })
    }

    /// Send one prompt and return the concatenated reply text.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::generation(
                &self.model,
                format!("HTTP {}: {}", status.as_u16(), error_text),
            ));
        }

        let reply: GenerateResponse = response.json().await?;
        reply.text().ok_or_else(|| {
            AppError::generation(
                &self.model,
                reply
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .map(|r| format!("prompt blocked: {r}"))
                    .unwrap_or_else(|| "empty reply".to_string()),
            )
        })
    }
}

#[async_trait]
impl VerdictGenerator for GeminiGenerator {
    async fn generate(&self, feed: &str, day: &DayKey) -> Result<VerdictPayload> {
        let corrections = match &self.corrections_file {
            Some(path) => load_corrections(path).await,
            None => Vec::new(),
        };
        let prompt = build_prompt(self.variant, feed, day, &corrections);

        log::info!("Requesting verdict for {} from {}", day, self.model);
        let reply = self
            .complete(&prompt)
            .await
            .map_err(|e| AppError::generation(day, e))?;
        parse_verdict(&reply, day)
    }
}

/// A manual override for a dish the model keeps getting wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub dish: String,
    pub cafeteria: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct CorrectionsFile {
    #[serde(default)]
    corrections: Vec<Correction>,
}

/// Read manual corrections. A missing file means none; a broken one is logged.
pub async fn load_corrections(path: &Path) -> Vec<Correction> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("Could not read corrections {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_slice::<CorrectionsFile>(&bytes) {
        Ok(file) => file.corrections,
        Err(e) => {
            log::warn!("Could not parse corrections {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Build the generator prompt for one day.
pub fn build_prompt(
    variant: PromptVariant,
    feed: &str,
    day: &DayKey,
    corrections: &[Correction],
) -> String {
    let framing = match variant {
        PromptVariant::PorkFree => {
            "You are a PORK-FREE food assistant for foreign students in Korea who do not eat pork.\n\
             Only pork is checked. This is a pork-free guide, NOT a halal certification."
        }
        PromptVariant::Halal => {
            "You are a halal food assistant for Muslim students in Korea.\n\
             Flag pork and pork derivatives, and mention alcohol-based seasoning where likely."
        }
    };

    let mut overrides = String::new();
    if !corrections.is_empty() {
        overrides.push_str("\nMANUAL CORRECTIONS (OVERRIDE YOUR OWN JUDGEMENT):\n");
        for c in corrections {
            overrides.push_str(&format!(
                "- {} at {}: {} - {}\n",
                c.dish,
                c.cafeteria,
                c.status.to_uppercase(),
                c.reason
            ));
        }
    }

    format!(
        r#"{framing}

TARGET DAY: {day}

VENUES:
- Student Cafeteria and Professor Cafeteria sell PACKAGE meals: the diner gets every item.
- A La Carte is INDIVIDUAL ordering: the diner picks dishes.

CONTAINS PORK: pork, ham, bacon, sausage, spam, tonkatsu/donkatsu, mandu/dumplings, budae-jjigae, gamjatang, jeyuk, menchi katsu.
USUALLY SAFE: chicken, beef, fish, seafood, tofu, eggs, vegetables.
SUSPICIOUS: ramen broth, kimchi stew, soft tofu stew, curry.
{overrides}
PACKAGE VERDICTS:
- SAFE: every item is acceptable
- WORTH IT: main dish acceptable, some sides must be skipped
- NOT WORTH: main dish is not acceptable
- NONE: no meal served

MENU DATA:
{feed}

Return ONLY this JSON object, no markdown:
{{
  "day": "{day}",
  "cafeterias": [
    {{"name": "Student Cafeteria", "type": "package", "meals": [
      {{"time": "Breakfast", "verdict": "SAFE|WORTH IT|NOT WORTH|NONE", "main_dish": "", "safe_items": [], "skip_items": [], "reason": ""}},
      {{"time": "Lunch", "verdict": "", "main_dish": "", "safe_items": [], "skip_items": [], "reason": ""}},
      {{"time": "Dinner", "verdict": "", "main_dish": "", "safe_items": [], "skip_items": [], "reason": ""}}
    ]}},
    {{"name": "Professor Cafeteria", "type": "package", "meals": []}},
    {{"name": "A La Carte", "type": "individual", "safe_options": [], "avoid": []}}
  ]
}}
"#
    )
}

/// Extract and validate the verdict object from a model reply.
pub fn parse_verdict(reply: &str, day: &DayKey) -> Result<VerdictPayload> {
    let body = strip_code_fence(reply);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AppError::generation(day, format!("reply is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(AppError::generation(day, "reply is not a JSON object"));
    }

    let payload = VerdictPayload::new(value);
    payload
        .parse()
        .map_err(|e| AppError::generation(day, format!("unexpected verdict shape: {e}")))?;
    Ok(payload)
}

/// Body of a ```json fenced block, or the outermost `{...}` span.
fn strip_code_fence(reply: &str) -> &str {
    if let Ok(fence) = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
        if let Some(body) = fence.captures(reply).and_then(|c| c.get(1)) {
            return body.as_str();
        }
    }
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}
