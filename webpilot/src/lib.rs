//! LLM-guided web page navigation assistance
//!
//! This crate implements the command-to-action pipeline behind a visual
//! navigation assistant: a user's natural-language or voice command and a
//! screenshot of the page go to a vision model, the model's structured
//! answer is validated and normalized into an action, the action is
//! resolved to a concrete page element, and the user is visually guided
//! to it. The assistant only ever points; it never clicks on the user's
//! behalf.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod intent;
pub mod locator;
pub mod orchestrator;
pub mod page;
pub mod resolver;
#[cfg(test)]
mod tests;

pub use config::Settings;
pub use dispatcher::{Dispatcher, PageSurface};
pub use errors::NavError;
pub use intent::{Action, ActionIntent, BoundingBox, ClickPoint, NavAction, Target};
pub use locator::Locator;
pub use orchestrator::{Orchestrator, TabInfo, TabProvider, TabSink};
pub use page::{PageNode, PageSnapshot, Viewport};
pub use resolver::{ActionResolver, VisionResolver};

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOrigin {
    Voice,
    Typed,
}

/// One raw user utterance. Immutable once created.
#[derive(Debug, Clone)]
pub struct Command {
    pub text: String,
    pub origin: CommandOrigin,
    pub issued_at: SystemTime,
}

impl Command {
    pub fn voice(text: &str) -> Self {
        Self {
            text: text.to_string(),
            origin: CommandOrigin::Voice,
            issued_at: SystemTime::now(),
        }
    }

    pub fn typed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            origin: CommandOrigin::Typed,
            issued_at: SystemTime::now(),
        }
    }
}

/// Holds captured screenshot data for one command round-trip.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// JPEG-encoded image bytes.
    pub data: Vec<u8>,
    /// Width of the image in pixels.
    pub width: u32,
    /// Height of the image in pixels.
    pub height: u32,
}

impl Screenshot {
    /// Wrap captured JPEG bytes, decoding the header for dimensions.
    /// Empty capture data is a capture failure, not a valid screenshot.
    pub fn from_jpeg(data: Vec<u8>) -> Result<Self, NavError> {
        if data.is_empty() {
            return Err(NavError::Capture(
                "screenshot capture returned empty data".to_string(),
            ));
        }
        let image = image::load_from_memory(&data)
            .map_err(|e| NavError::Capture(format!("could not decode screenshot: {e}")))?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            data,
        })
    }
}
