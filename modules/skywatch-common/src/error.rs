use thiserror::Error;

use crate::types::IncidentCategory;

#[derive(Error, Debug)]
pub enum SkywatchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Malicious content: {0}")]
    MaliciousContent(String),

    #[error("Out of scope ({category}): {reason}")]
    OutOfScope { category: String, reason: String },

    #[error("Rejected ({category}): {reason}")]
    Rejected {
        category: IncidentCategory,
        reason: String,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Store conflict: {0}")]
    StoreConflict(String),

    #[error("Store failure: {0}")]
    StoreFailure(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SkywatchError {
    /// Recoverable kinds are handled inside the pipeline and never surface
    /// to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SkywatchError::UpstreamUnavailable(_) | SkywatchError::StoreConflict(_)
        )
    }

    /// Short category string for API responses and counters.
    pub fn category(&self) -> String {
        match self {
            SkywatchError::InvalidInput(_) => "invalid_input".to_string(),
            SkywatchError::Unauthorized => "unauthorized".to_string(),
            SkywatchError::Forbidden(c) => c.clone(),
            SkywatchError::MaliciousContent(_) => "malicious_content".to_string(),
            SkywatchError::OutOfScope { category, .. } => category.clone(),
            SkywatchError::Rejected { category, .. } => category.to_string(),
            SkywatchError::UpstreamUnavailable(_) => "upstream_unavailable".to_string(),
            SkywatchError::StoreConflict(_) => "store_conflict".to_string(),
            SkywatchError::StoreFailure(_) => "store_failure".to_string(),
            SkywatchError::Timeout(_) => "timeout".to_string(),
            SkywatchError::Config(_) => "config".to_string(),
            SkywatchError::Anyhow(_) => "internal".to_string(),
        }
    }
}
