use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Outcome of a failed upstream call. Every transport, status and decoding
/// problem collapses into one of these, so callers only ever match on a
/// single type.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("upstream did not respond in time")]
    Timeout,

    #[error("upstream unreachable: {message}")]
    Unreachable { message: String },

    #[error("upstream returned HTTP {status}")]
    UpstreamError { status: u16 },

    #[error("upstream returned an unreadable body: {message}")]
    InvalidBody { message: String },

    #[error("upstream rejected the request: {message}")]
    Rejected { message: String },
}

impl FetchFailure {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unreachable { .. } => "unreachable",
            Self::UpstreamError { .. } => "upstream_error",
            Self::InvalidBody { .. } => "invalid_body",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Errors that are allowed to reach the route layer.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("all {} upstream resources failed", failures.len())]
    AllUpstreamsFailed {
        failures: BTreeMap<String, FetchFailure>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllUpstreamsFailed { .. } => "all_upstreams_failed",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// JSON error envelope returned by every failing route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: code.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
