//! Error types for the browser-facing side of a harvest run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Failures raised while driving the marketplace pages.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The automation context could not be created. Fatal for the run.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("scraper `{0}` is not initialized, call initialize() first")]
    NotInitialized(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    #[error("no selector matched for {0}")]
    SelectorNotFound(String),

    /// Captcha or account verification wall instead of results.
    #[error("blocked by marketplace: {0}")]
    Blocked(String),

    #[error("invalid extraction rules: {0}")]
    Rules(String),

    #[error("browser driver error: {0}")]
    Driver(String),
}

impl HarvestError {
    /// Whether this error means the automation context itself is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::Launch(_))
    }
}
