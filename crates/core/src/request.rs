//! Request descriptors and responses.
//!
//! A [`RequestSpec`] is built once and never mutated by the client. Whether a
//! send is the first try or a replay after a refresh is tracked separately by
//! [`Attempt`], which the client passes explicitly.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storefront_protocol::endpoints;

use crate::error::{Error, Result};

/// Which send of a request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attempt {
    /// First send. A 401 may start or join a refresh.
    #[default]
    Initial,
    /// Replay after a refresh. A 401 is returned as-is.
    Replay,
}

impl Attempt {
    pub fn is_replay(self) -> bool {
        matches!(self, Self::Replay)
    }
}

/// Immutable description of an API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    with_credentials: bool,
    skip_refresh: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            with_credentials: true,
            skip_refresh: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    /// Sends without the cookie jar (public catalogue endpoints).
    pub fn without_credentials(mut self) -> Self {
        self.with_credentials = false;
        self
    }

    /// Opts out of the 401 refresh protocol. Used for auth-service calls where
    /// a 401 means rejected input rather than an expired session.
    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body_json(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    pub fn targets_refresh_endpoint(&self) -> bool {
        endpoints::is_refresh_path(&self.path)
    }

    /// Whether a 401 for this request on `attempt` may enter the refresh protocol.
    pub fn is_refreshable(&self, attempt: Attempt) -> bool {
        !attempt.is_replay() && !self.skip_refresh && !self.targets_refresh_endpoint()
    }
}

/// Status and decoded body of an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Converts non-2xx responses into [`Error::Resource`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::resource(self.status, &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.body)?)
    }

    /// The `message` field of the body, or an empty string.
    pub fn message(&self) -> String {
        storefront_protocol::MessageBody::from_value(&self.body).unwrap_or_default()
    }
}

/// Decodes a raw response body: JSON when it parses, a JSON string otherwise,
/// `null` when empty.
pub(crate) fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
