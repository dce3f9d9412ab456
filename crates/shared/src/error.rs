use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    Internal,
}

/// Error body a comment server answers with when it refuses a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decodes an error body; anything unparseable becomes an `Internal` error
    /// carrying the raw text.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| {
            Self::new(ErrorCode::Internal, String::from_utf8_lossy(body).into_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_error_body() {
        let err = ApiError::parse(br#"{"code":"forbidden","message":"not yours"}"#);
        assert_eq!(err, ApiError::new(ErrorCode::Forbidden, "not yours"));
        assert_eq!(err.to_string(), "Forbidden: not yours");
    }

    #[test]
    fn falls_back_to_internal_for_plain_text() {
        let err = ApiError::parse(b"bad gateway");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "bad gateway");
    }
}
