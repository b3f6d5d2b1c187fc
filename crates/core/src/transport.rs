//! Transport layer: how a [`RequestSpec`] reaches the backend.
//!
//! [`SessionClient`](crate::SessionClient) only sees the [`Transport`] trait.
//! [`HttpTransport`] is the production implementation on top of `reqwest`,
//! keeping the `auth_token` / `refresh_token` cookies in its jar. Tests use
//! the in-memory backend in [`crate::testing`].

use std::future::Future;
use std::pin::Pin;

use tracing::trace;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::request::{ApiResponse, RequestSpec, decode_body};

/// Boxed future returned by [`Transport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Sends one request and returns the raw response.
///
/// Implementations return `Ok` for every HTTP status, including 401 and 5xx;
/// only transport failures are `Err`, and they are always [`Error::Network`].
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a RequestSpec) -> SendFuture<'a>;
}

/// `reqwest`-backed transport with a persistent cookie jar.
pub struct HttpTransport {
    config: ClientConfig,
    /// Client carrying the session cookies.
    credentialed: reqwest::Client,
    /// Client with no cookie jar, for requests sent without credentials.
    anonymous: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            credentialed: build_client(config, true)?,
            anonymous: build_client(config, false)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn execute(&self, request: &RequestSpec) -> Result<ApiResponse> {
        let url = self.config.endpoint_url(request.path());
        let client = if request.with_credentials() {
            &self.credentialed
        } else {
            &self.anonymous
        };

        let mut builder = client.request(request.method().clone(), &url);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(body) = request.body_json() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {url}: {e}", request.method())))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read response body from {url}: {e}")))?;

        trace!(target = "session.transport", method = %request.method(), %url, status, "response received");
        Ok(ApiResponse::new(status, decode_body(&text)))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a RequestSpec) -> SendFuture<'a> {
        Box::pin(self.execute(request))
    }
}

fn build_client(config: &ClientConfig, cookies: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout())
        .cookie_store(cookies);
    if let Some(agent) = &config.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config() {
        let err = HttpTransport::new(&ClientConfig::new("localhost:8080")).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Nothing listens on the discard port.
        let config = ClientConfig::new("http://127.0.0.1:9/api")
            .with_timeout(std::time::Duration::from_millis(500));
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport
            .send(&RequestSpec::get("/products"))
            .await
            .unwrap_err();
        assert!(err.is_network(), "unexpected error: {err:?}");
    }
}
