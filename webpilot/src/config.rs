//! Runtime settings for the navigation pipeline.
//!
//! Settings are read-only inputs persisted outside the core. A missing
//! model API key is a hard precondition failure at command time; there is
//! no degraded mode for action resolution.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Default timeout for the model round-trip. The underlying transport
/// default is not relied on; the timeout is always explicit.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Credential for the vision model API. Absent means the resolver is
    /// not configured and commands fail their precondition check.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
    /// Optional third-party TTS credential, consumed by the voice-output
    /// collaborator.
    pub tts_api_key: Option<String>,
    /// Voice reference id for the third-party TTS service.
    pub tts_reference_id: Option<String>,
    /// Show debug markers on resolved targets.
    pub debug_markers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tts_api_key: None,
            tts_reference_id: None,
            debug_markers: false,
        }
    }
}

impl Settings {
    /// Load settings from the environment (`WEBPILOT_*`, falling back to
    /// `ANTHROPIC_API_KEY` for the credential). A `.env` file is honored
    /// when present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            api_key: std::env::var("WEBPILOT_API_KEY")
                .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("WEBPILOT_MODEL").unwrap_or(defaults.model),
            api_base: std::env::var("WEBPILOT_API_BASE").unwrap_or(defaults.api_base),
            request_timeout_secs: std::env::var("WEBPILOT_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            tts_api_key: std::env::var("WEBPILOT_TTS_API_KEY").ok(),
            tts_reference_id: std::env::var("WEBPILOT_TTS_REFERENCE_ID").ok(),
            debug_markers: std::env::var("WEBPILOT_DEBUG_MARKERS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
