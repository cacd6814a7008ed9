//! Error types for friend API calls

use favor_core::StudentId;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure: DNS, TLS, connection reset
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status without a readable body
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Response code 4003
    #[error("token quota exceeded")]
    QuotaExceeded,

    #[error("request rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("response payload is encrypted")]
    Encrypted,

    #[error("response has no assist list")]
    MissingData,

    #[error("student {0} is not in the assist list")]
    StudentNotFound(StudentId),

    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

impl ApiError {
    /// Errors after which the previous value should be kept quietly
    pub fn is_throttled(&self) -> bool {
        matches!(self, ApiError::QuotaExceeded)
    }
}
