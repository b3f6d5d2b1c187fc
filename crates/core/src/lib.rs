//! Authenticated API session client for the storefront backend.
//!
//! [`SessionClient`] sends requests to the storefront REST API with the
//! session cookies attached. When the access token has expired it refreshes
//! it once per burst of failures and replays the failed requests; when the
//! refresh token is gone too it clears the session and sends the UI to the
//! login page.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use session::{ClientConfig, Credentials, LogNavigator, RequestSpec, SessionClient};
//! # #[tokio::main]
//! # async fn main() -> session::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let client = SessionClient::new(&config, Arc::new(LogNavigator))?;
//!
//! client.login(&Credentials::new("khach@shop.vn", "abc123")).await?;
//! let orders: serde_json::Value = client.get_json("/orders").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod navigation;
pub mod refresh;
pub mod request;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod transport;
pub mod validation;

pub use client::SessionClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use navigation::{LogNavigator, LoginRedirect, Navigator, post_login_destination};
pub use refresh::RefreshState;
pub use request::{ApiResponse, Attempt, RequestSpec};
pub use state::SessionSnapshot;
pub use storefront_protocol::{Credentials, MessageBody, RegisterRequest, UserProfile, endpoints};
pub use transport::{HttpTransport, Transport};
