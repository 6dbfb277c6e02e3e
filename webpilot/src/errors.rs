use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("Malformed model response: {0}")]
    Validation(String),

    #[error("No JSON found in model output: {0}")]
    Parse(String),

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
