//! Vision action resolver: one screenshot plus one command in, one
//! validated [`ActionIntent`] out.
//!
//! The model output is adversarial by construction: wrong types,
//! out-of-range numbers, free-text action labels, JSON wrapped in prose.
//! Extraction is multi-stage and validation is defensive at every field
//! (see [`crate::intent`]).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::config::Settings;
use crate::errors::NavError;
use crate::intent::ActionIntent;
use crate::{Command, Screenshot};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = r#"You are an intelligent web navigation assistant. You will be given a SCREENSHOT of a webpage and a user's command.
Your job is to:
1. Analyze the image to understand the full visual layout.
2. Understand the user's command.
3. Identify the best element (button, link, input) to interact with to achieve the user's goal.
4. Provide both text selectors AND precise coordinates for the target element.

Return your response as JSON with this structure:
{
  "reasoning": "Brief explanation of what you see and why you chose this action.",
  "action": "click" | "highlight" | "scroll" | "goback" | "not_found",
  "selector": "The EXACT text on the element (can be null if coordinates are provided)",
  "click_point": {"x": 0.5, "y": 0.3} | null,
  "bbox": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.05} | null,
  "direction": "up" | "down" (for scroll),
  "speak": "What to say to the user"
}

COORDINATE SYSTEM:
- All coordinates are normalized (0.0 to 1.0) relative to the image dimensions
- click_point: Center point where user should click (x, y)
- bbox: Bounding box of the target element (x, y, width, height)
- x=0 is left edge, x=1 is right edge
- y=0 is top edge, y=1 is bottom edge

IMPORTANT:
- ALWAYS provide click_point and bbox when you can visually identify a target element
- Set click_point and bbox to null only for scroll/goback/not_found actions
- selector can be null if coordinates are reliable, but prefer providing both when possible
- For elements without clear text (icons, images), rely on coordinates and describe in reasoning"#;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
static BARE_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// The seam between the orchestrator and the vision model, so tests and
/// alternative backends can stand in for the real API.
#[async_trait]
pub trait ActionResolver: Send + Sync {
    async fn resolve(
        &self,
        command: &Command,
        screenshot: &Screenshot,
        page_url: &str,
    ) -> Result<ActionIntent, NavError>;
}

/// Resolver backed by the Anthropic messages API.
pub struct VisionResolver {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl VisionResolver {
    /// Build a resolver from settings. Fails the precondition when no
    /// API credential is configured.
    pub fn new(settings: &Settings) -> Result<Self, NavError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| NavError::Precondition("model API key not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| NavError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    fn user_prompt(command: &Command, page_url: &str) -> String {
        format!(
            "User Command: \"{}\"\n\n\
             Analyze the attached screenshot for the page at URL: {}.\n\
             Identify the target element and provide:\n\
             1. The action to take\n\
             2. Text selector (if readable text exists)\n\
             3. Precise normalized coordinates (click_point and bbox)\n\
             4. Clear reasoning for your choice\n\n\
             Respond with JSON only.",
            command.text, page_url
        )
    }
}

#[async_trait]
impl ActionResolver for VisionResolver {
    #[instrument(level = "debug", skip(self, command, screenshot))]
    async fn resolve(
        &self,
        command: &Command,
        screenshot: &Screenshot,
        page_url: &str,
    ) -> Result<ActionIntent, NavError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": STANDARD.encode(&screenshot.data),
                        },
                    },
                    { "type": "text", "text": Self::user_prompt(command, page_url) },
                ],
            }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NavError::Timeout(format!("model request timed out: {e}"))
                } else {
                    NavError::Upstream(format!("model request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let head: String = detail.chars().take(400).collect();
            error!(%status, detail = %head, "model API returned an error");
            return Err(NavError::Upstream(format!("model API error: {status}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| NavError::Upstream(format!("invalid model response body: {e}")))?;
        let text = data["content"][0]["text"].as_str().ok_or_else(|| {
            NavError::Upstream("no text content in model response".to_string())
        })?;
        debug!(raw = %text.chars().take(400).collect::<String>(), "model replied");

        let value = extract_json(text)?;
        ActionIntent::from_json(&value)
    }
}

/// Pull a JSON value out of the model's text output: whole-response parse
/// first, then a fenced code block, then the first brace-delimited
/// substring.
pub(crate) fn extract_json(text: &str) -> Result<Value, NavError> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }
    let candidate = FENCED_JSON
        .captures(text)
        .map(|c| c[1].to_string())
        .or_else(|| BARE_JSON.find(text).map(|m| m.as_str().to_string()))
        .ok_or_else(|| {
            NavError::Parse("could not find JSON in model output".to_string())
        })?;
    serde_json::from_str(&candidate)
        .map_err(|e| NavError::Parse(format!("failed to parse extracted JSON: {e}")))
}
