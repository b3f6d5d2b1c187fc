//! Error types for the session client.

use storefront_protocol::MessageBody;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by [`SessionClient`](crate::SessionClient).
///
/// `Error` is `Clone` because a single refresh failure is delivered to every
/// request that was queued behind it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Login rejected by the auth service. Carries the server's message.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Input rejected before anything was sent.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The refresh token is missing, invalid or expired; the user must log in again.
    #[error("session expired: {0}")]
    AuthExpired(String),

    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx API response passed through to the caller.
    #[error("{message} (status {status})")]
    Resource { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Builds a [`Error::Resource`] from a status and the JSON error body.
    pub(crate) fn resource(status: u16, body: &serde_json::Value) -> Self {
        let message = MessageBody::from_value(body)
            .or_else(|| body.as_str().filter(|s| !s.is_empty()).map(str::to_owned))
            .unwrap_or_else(|| default_message(status));
        Self::Resource { status, message }
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Resource { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the user has to authenticate again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> &str {
        match self {
            Self::InvalidCredentials(m)
            | Self::AuthExpired(m)
            | Self::Network(m)
            | Self::Decode(m)
            | Self::Config(m) => m,
            Self::Validation { message, .. } => message,
            Self::Resource { message, .. } => message,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

fn default_message(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_error_prefers_server_message() {
        let err = Error::resource(409, &json!({"message": "Sản phẩm đã tồn tại"}));
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.user_message(), "Sản phẩm đã tồn tại");
    }

    #[test]
    fn resource_error_falls_back_to_reason_phrase() {
        let err = Error::resource(404, &serde_json::Value::Null);
        assert_eq!(err.user_message(), "Not Found");

        let err = Error::resource(599, &json!({}));
        assert_eq!(err.user_message(), "request failed with status 599");
    }

    #[test]
    fn resource_error_accepts_plain_text_body() {
        let err = Error::resource(500, &json!("database unavailable"));
        assert_eq!(err.user_message(), "database unavailable");
    }

    #[test]
    fn classification_helpers() {
        assert!(Error::AuthExpired("x".into()).is_auth_expired());
        assert!(Error::Network("x".into()).is_network());
        assert_eq!(Error::Network("x".into()).status(), None);
        assert_eq!(
            Error::validation("email", "bad").to_string(),
            "invalid email: bad"
        );
    }
}
