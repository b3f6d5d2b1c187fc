//! Scripted backend implementing [`Transport`] in memory.
//!
//! Models the storefront's cookie auth: the server has one current access
//! token version, the simulated cookie jar holds the version the client
//! last received, and a request is authorised only when the two match.
//! [`FakeBackend::expire_access`] rotates the server side, so every request
//! after it gets a 401 until the client refreshes.
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(FakeBackend::new());
//! backend.sign_in(user);
//! backend.expire_access();
//!
//! let client = SessionClient::with_transport(backend.clone(), navigator, "/auth/login");
//! client.request(&RequestSpec::get("/orders")).await?;
//! assert_eq!(backend.calls("/auth/refresh-token"), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{Value, json};
use storefront_protocol::{Credentials, UserProfile, endpoints};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::request::{ApiResponse, RequestSpec};
use crate::transport::{SendFuture, Transport};

/// One request as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Access token version carried by the request, if any.
    pub access: Option<u64>,
}

#[derive(Default)]
struct State {
    server_access: u64,
    client_access: Option<u64>,
    client_refresh: bool,
    refresh_revoked: bool,
    refresh_network_failure: bool,
    refresh_delay: Duration,
    logout_failure: Option<(u16, String)>,
    account: Option<(Credentials, UserProfile)>,
    routes: HashMap<String, (u16, Value)>,
    public_paths: HashSet<String>,
    network_failures: HashSet<String>,
    holds: HashMap<String, watch::Sender<bool>>,
    sent: Vec<SentRequest>,
}

/// In-memory storefront backend.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the account accepted by `POST /auth/login`.
    pub fn with_account(&self, credentials: Credentials, user: UserProfile) {
        self.state.lock().account = Some((credentials, user));
    }

    /// Starts with `user` signed in: valid access and refresh cookies.
    pub fn sign_in(&self, user: UserProfile) {
        let mut state = self.state.lock();
        let password = state
            .account
            .as_ref()
            .map(|(creds, _)| creds.password.clone())
            .unwrap_or_default();
        state.account = Some((Credentials::new(user.email.clone(), password), user));
        state.client_access = Some(state.server_access);
        state.client_refresh = true;
        state.refresh_revoked = false;
    }

    /// Invalidates the access token the client currently holds.
    pub fn expire_access(&self) {
        self.state.lock().server_access += 1;
    }

    /// Makes the refresh endpoint reject the client's refresh token.
    pub fn revoke_refresh(&self) {
        self.state.lock().refresh_revoked = true;
    }

    pub fn fail_refresh_with_network_error(&self) {
        self.state.lock().refresh_network_failure = true;
    }

    /// Delays refresh responses so concurrent requests pile up behind them.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().refresh_delay = delay;
    }

    pub fn fail_logout(&self, status: u16, message: &str) {
        self.state.lock().logout_failure = Some((status, message.to_string()));
    }

    /// Returns a transport error for every request to `path`.
    pub fn fail_network(&self, path: &str) {
        self.state.lock().network_failures.insert(path.to_string());
    }

    /// Serves `status`/`body` for `path` once the request is authorised.
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.state
            .lock()
            .routes
            .insert(path.to_string(), (status, body));
    }

    /// Answers requests to `path` as of the moment they arrive, but withholds
    /// the response until [`release`](Self::release) is called.
    pub fn hold(&self, path: &str) {
        let (tx, _rx) = watch::channel(false);
        self.state.lock().holds.insert(path.to_string(), tx);
    }

    /// Lets held and future requests to `path` complete.
    pub fn release(&self, path: &str) {
        if let Some(tx) = self.state.lock().holds.get(path) {
            tx.send_replace(true);
        }
    }

    /// Serves `path` without requiring an access token.
    pub fn make_public(&self, path: &str) {
        self.state.lock().public_paths.insert(path.to_string());
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.state.lock().sent.clone()
    }

    /// Number of requests received for `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    /// Access token version the server currently accepts.
    pub fn current_access(&self) -> u64 {
        self.state.lock().server_access
    }

    pub fn has_refresh_cookie(&self) -> bool {
        self.state.lock().client_refresh
    }

    async fn handle(&self, request: &RequestSpec) -> Result<ApiResponse> {
        let refresh_delay = {
            let mut state = self.state.lock();
            let access = if request.with_credentials() {
                state.client_access
            } else {
                None
            };
            state.sent.push(SentRequest {
                method: request.method().clone(),
                path: request.path().to_string(),
                query: request.query_pairs().to_vec(),
                body: request.body_json().cloned(),
                access,
            });
            if state.network_failures.contains(request.path()) {
                return Err(Error::Network(format!(
                    "connection reset while sending {}",
                    request.path()
                )));
            }
            state.refresh_delay
        };

        if request.path() == endpoints::REFRESH_TOKEN {
            if !refresh_delay.is_zero() {
                tokio::time::sleep(refresh_delay).await;
            }
            return self.refresh(request);
        }

        let (response, hold) = {
            let mut state = self.state.lock();
            let response = match request.path() {
                endpoints::LOGIN => state.login(request),
                endpoints::LOGOUT => state.logout(),
                endpoints::REGISTER => message(200, "Registration successful, check your email"),
                endpoints::FORGOT_PASSWORD => message(200, "Password reset email sent"),
                path => state.resource(path, request.with_credentials()),
            };
            (response, state.holds.get(request.path()).map(watch::Sender::subscribe))
        };

        if let Some(mut released) = hold {
            // The sender lives in the backend, so this only returns on release.
            let _ = released.wait_for(|open| *open).await;
        }
        Ok(response)
    }

    fn refresh(&self, request: &RequestSpec) -> Result<ApiResponse> {
        let mut state = self.state.lock();
        if state.refresh_network_failure {
            return Err(Error::Network("refresh endpoint unreachable".into()));
        }
        if !request.with_credentials() || !state.client_refresh {
            return Ok(message(401, "Refresh token not found"));
        }
        if state.refresh_revoked {
            return Ok(message(401, "Refresh token is invalid or expired"));
        }
        state.client_access = Some(state.server_access);
        Ok(message(200, "Access token refreshed"))
    }
}

impl State {
    fn login(&mut self, request: &RequestSpec) -> ApiResponse {
        let submitted: Option<Credentials> = request
            .body_json()
            .and_then(|body| serde_json::from_value(body.clone()).ok());
        let accepted = matches!(
            (&self.account, &submitted),
            (Some((expected, _)), Some(given)) if expected == given
        );
        if !accepted {
            return message(401, "Invalid email or password");
        }
        self.server_access += 1;
        self.client_access = Some(self.server_access);
        self.client_refresh = true;
        self.refresh_revoked = false;
        message(200, "Login successful")
    }

    fn logout(&mut self) -> ApiResponse {
        if let Some((status, text)) = self.logout_failure.clone() {
            return message(status, &text);
        }
        self.client_access = None;
        self.client_refresh = false;
        message(200, "Logged out")
    }

    fn resource(&self, path: &str, with_credentials: bool) -> ApiResponse {
        let authorised =
            with_credentials && self.client_access == Some(self.server_access);
        if !authorised && !self.public_paths.contains(path) {
            return message(401, "Access token expired");
        }
        if let Some((status, body)) = self.routes.get(path) {
            return ApiResponse::new(*status, body.clone());
        }
        if path == endpoints::CURRENT_USER {
            return match &self.account {
                Some((_, user)) => ApiResponse::new(
                    200,
                    serde_json::to_value(user).unwrap_or(Value::Null),
                ),
                None => message(404, "User not found"),
            };
        }
        ApiResponse::new(200, json!({ "path": path }))
    }
}

fn message(status: u16, text: &str) -> ApiResponse {
    ApiResponse::new(status, json!({ "message": text }))
}

impl Transport for FakeBackend {
    fn send<'a>(&'a self, request: &'a RequestSpec) -> SendFuture<'a> {
        Box::pin(self.handle(request))
    }
}
