use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable error category exposed to callers for programmatic branching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// HTTP 401.
    Unauthorized,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 422.
    Validation,
    /// HTTP 429.
    RateLimited,
    /// Any HTTP status >= 500.
    ServerError,
    /// The attempt did not complete before its deadline.
    Timeout,
    /// Connection refused, DNS failure, offline and similar.
    Network,
    /// The caller's cancel signal fired.
    Cancelled,
    /// Everything else.
    Unknown,
}

impl ErrorKind {
    /// Maps an HTTP status code to its error kind.
    ///
    /// Total over `u16`: unmapped codes (including 2xx/3xx) are [`ErrorKind::Unknown`].
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            422 => Self::Validation,
            429 => Self::RateLimited,
            500..=u16::MAX => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Stable wire code, e.g. `"RATE_LIMITED"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Network => "NETWORK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// User-facing message used when the server does not supply one.
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Unauthorized => "Session expired. Please sign in again.",
            Self::Forbidden => "You don't have permission to do this.",
            Self::NotFound => "Resource not found.",
            Self::Validation => "Invalid data.",
            Self::RateLimited => "Too many requests. Please try again later.",
            Self::ServerError => "Server error. Please try again later.",
            Self::Timeout => "Slow connection. The request timed out.",
            Self::Network => "You are offline or the network is not responding.",
            Self::Cancelled => "Request cancelled.",
            Self::Unknown => "Unexpected error.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra context attached to an [`AppError`].
#[derive(Clone, Debug)]
pub enum ErrorDetails {
    /// Parsed response body of a non-success reply.
    Body(serde_json::Value),
    /// Underlying failure that was normalized into the error.
    Cause(Arc<dyn std::error::Error + Send + Sync>),
}

/// The single error type returned by this crate.
///
/// `Display` renders [`AppError::message`], which is suitable for direct display.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub details: Option<ErrorDetails>,
}

impl AppError {
    /// Error with an explicit message and no status or details.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Error carrying the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Builds the error for a non-success response.
    ///
    /// The message comes from the body's `message` field, then its `error`
    /// field, then the kind's default.
    pub fn from_response(status: u16, body: serde_json::Value) -> Self {
        let kind = ErrorKind::from_status(status);
        let message = server_message(&body)
            .map(str::to_owned)
            .unwrap_or_else(|| kind.default_message().to_owned());
        Self {
            kind,
            message,
            status: Some(status),
            details: Some(ErrorDetails::Body(body)),
        }
    }

    /// Attaches the underlying failure, replacing any previous details.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.details = Some(ErrorDetails::Cause(Arc::new(cause)));
        self
    }

    pub(crate) fn with_shared_cause(
        mut self,
        cause: Arc<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        self.details = Some(ErrorDetails::Cause(cause));
        self
    }

    /// `true` when the caller aborted the request. Screens usually ignore
    /// these instead of showing an error.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Generic message for this error's kind, ignoring any server message.
    pub fn default_message(&self) -> &'static str {
        self.kind.default_message()
    }

    /// Parsed response body, when the error came from a non-success reply.
    pub fn body(&self) -> Option<&serde_json::Value> {
        match &self.details {
            Some(ErrorDetails::Body(body)) => Some(body),
            _ => None,
        }
    }
}

fn server_message(body: &serde_json::Value) -> Option<&str> {
    ["message", "error"]
        .iter()
        .filter_map(|field| body.get(field).and_then(serde_json::Value::as_str))
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AppError, ErrorDetails, ErrorKind};

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(599), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_status(409), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_status(200), ErrorKind::Unknown);
    }

    #[test]
    fn status_mapping_is_stable_across_calls() {
        for status in [0u16, 200, 401, 418, 429, 502, u16::MAX] {
            assert_eq!(ErrorKind::from_status(status), ErrorKind::from_status(status));
        }
    }

    #[test]
    fn kind_serializes_as_screaming_code() {
        assert_eq!(
            serde_json::to_value(ErrorKind::RateLimited).expect("kind must serialize"),
            json!("RATE_LIMITED")
        );
        assert_eq!(ErrorKind::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn response_error_prefers_message_then_error_field() {
        let err = AppError::from_response(422, json!({"message": "name is required", "error": "x"}));
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "name is required");
        assert_eq!(err.status, Some(422));

        let err = AppError::from_response(403, json!({"error": "not your album"}));
        assert_eq!(err.message, "not your album");
    }

    #[test]
    fn response_error_falls_back_to_default_message() {
        let err = AppError::from_response(503, serde_json::Value::Null);
        assert_eq!(err.message, ErrorKind::ServerError.default_message());
        assert!(matches!(err.details, Some(ErrorDetails::Body(serde_json::Value::Null))));

        let err = AppError::from_response(404, json!("plain text body"));
        assert_eq!(err.message, ErrorKind::NotFound.default_message());
        assert_eq!(err.body(), Some(&json!("plain text body")));
    }

    #[test]
    fn display_is_the_user_message() {
        let err = AppError::from_kind(ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "Request cancelled.");
        assert!(err.is_cancelled());
    }

    #[test]
    fn default_message_ignores_server_text() {
        let err = AppError::from_response(429, json!({"message": "slow down, buddy"}));
        assert_eq!(err.message, "slow down, buddy");
        assert_eq!(err.default_message(), "Too many requests. Please try again later.");
    }
}
