use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by a [`crate::dom::Document`] backend.
#[derive(Debug, Error)]
pub enum DomError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid locator `{css}`: {reason}")]
    Locator { css: String, reason: String },

    #[error("no page is loaded")]
    NoPage,

    #[error("node no longer belongs to the loaded page")]
    StaleNode,

    #[error("click failed: {0}")]
    Click(String),

    #[error("script not supported by this backend: {0}")]
    Unsupported(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<chromiumoxide::error::CdpError> for DomError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        DomError::Browser(e.to_string())
    }
}

/// Failures of the standalone repair pass over an exported file.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no questions found in {}", .0.display())]
    Empty(PathBuf),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
