//! The session client: authenticated requests with transparent token refresh.
//!
//! # Request Flow
//!
//! 1. The request is sent with the current cookies
//! 2. Anything other than a 401 is returned as-is (non-2xx as [`Error::Resource`])
//! 3. A 401 on an initial attempt enters the refresh protocol:
//!    - no refresh in flight: this request leads it
//!    - refresh in flight: this request parks until it settles
//! 4. On success the request is replayed once; a second 401 is returned as-is
//! 5. On failure every parked request gets the same [`Error::AuthExpired`] and
//!    the leader tears the session down and redirects to login once
//!
//! If the leading request is dropped mid-refresh, a parked request takes the
//! refresh over; nothing is reported as expired.
//!
//! Requests to the refresh endpoint, replays and requests marked
//! [`RequestSpec::skip_refresh`] never enter step 3.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use storefront_protocol::{Credentials, RegisterRequest, UserProfile, endpoints};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::navigation::{LoginRedirect, Navigator};
use crate::refresh::{Admission, RefreshCoordinator, RefreshState, Release};
use crate::request::{ApiResponse, Attempt, RequestSpec};
use crate::state::{SessionSnapshot, SessionStore};
use crate::transport::{HttpTransport, Transport};
use crate::validation;

/// Authenticated API client owning the session and refresh state.
///
/// Construct one per application instance and share it by reference or `Arc`.
/// All methods take `&self`; concurrent requests are supported.
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
    refresh: RefreshCoordinator,
    session: SessionStore,
    location: Mutex<Option<String>>,
    login_route: String,
}

impl SessionClient {
    /// Creates a client talking HTTP to `config.base_url`.
    pub fn new(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            navigator,
            config.login_route.clone(),
        ))
    }

    /// Creates a client over an arbitrary transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            navigator,
            refresh: RefreshCoordinator::new(),
            session: SessionStore::new(),
            location: Mutex::new(None),
            login_route: login_route.into(),
        }
    }

    /// Current read-only view of the session.
    pub fn session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Subscribes to session changes (sign-in, sign-out, loading flag).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    /// Records the UI location carried in the login redirect on teardown.
    pub fn set_location(&self, path: impl Into<String>) {
        *self.location.lock() = Some(path.into());
    }

    /// Sends `spec`, recovering from an expired access token.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] if the transport fails
    /// - [`Error::AuthExpired`] if a refresh was needed and failed
    /// - [`Error::Resource`] for any other non-2xx response
    pub async fn request(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        self.request_with_attempt(spec, Attempt::Initial).await
    }

    /// Like [`request`](Self::request), with the attempt given explicitly.
    ///
    /// A [`Attempt::Replay`] is sent exactly once and never starts a refresh.
    pub async fn request_with_attempt(
        &self,
        spec: &RequestSpec,
        attempt: Attempt,
    ) -> Result<ApiResponse> {
        let generation = self.refresh.generation();
        let response = self.transport.send(spec).await?;

        if !response.is_unauthorized() || !spec.is_refreshable(attempt) {
            return response.into_result();
        }

        debug!(
            target = "session.request",
            method = %spec.method(),
            path = spec.path(),
            generation,
            "access token rejected"
        );
        self.recover(generation).await?;

        let replay = self.transport.send(spec).await?;
        debug!(
            target = "session.request",
            method = %spec.method(),
            path = spec.path(),
            status = replay.status,
            "request replayed"
        );
        replay.into_result()
    }

    /// Sends a GET and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(&RequestSpec::get(path)).await?.json()
    }

    /// Sends `spec` and decodes the JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T> {
        self.request(spec).await?.json()
    }

    async fn recover(&self, generation: u64) -> Result<()> {
        loop {
            match self.refresh.admit(generation) {
                Admission::Lead(lease) => {
                    let loading = self.session.begin_loading();
                    let outcome = self.refresh().await.map_err(into_refresh_failure);
                    lease.settle(outcome.clone());
                    drop(loading);

                    if let Err(err) = &outcome {
                        warn!(target = "session.refresh", error = %err, "refresh failed");
                        self.teardown();
                    }
                    return outcome;
                }
                // A closed channel can only mean the lease went away unsettled.
                Admission::Wait(rx) => match rx.await.unwrap_or(Release::Retry) {
                    Release::Settled(outcome) => return outcome,
                    Release::Retry => {
                        debug!(target = "session.refresh", generation, "refresh leader dropped, re-admitting");
                    }
                },
                Admission::Settled(outcome) => return outcome,
            }
        }
    }

    fn teardown(&self) {
        self.session.clear();
        let redirect = LoginRedirect {
            to: self.login_route.clone(),
            from: self.location.lock().clone(),
        };
        info!(target = "session.auth", to = %redirect.to, from = ?redirect.from, "session cleared, redirecting to login");
        self.navigator.redirect_to_login(redirect);
    }

    /// Asks the auth service to rotate the access token.
    ///
    /// This is the raw call; it is not coordinated with concurrent requests.
    /// [`request`](Self::request) invokes it through the single-flight path.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthExpired`] if the refresh token is missing or invalid (401)
    /// - [`Error::Network`] on transport failure
    /// - [`Error::Resource`] on any other non-2xx response
    pub async fn refresh(&self) -> Result<()> {
        let spec = RequestSpec::post(endpoints::REFRESH_TOKEN);
        let response = self.transport.send(&spec).await?;

        if response.is_success() {
            info!(target = "session.refresh", "access token refreshed");
            return Ok(());
        }
        if response.is_unauthorized() {
            let message = response.message();
            return Err(Error::AuthExpired(if message.is_empty() {
                "refresh token missing or expired".into()
            } else {
                message
            }));
        }
        Err(Error::resource(response.status, &response.body))
    }

    /// Signs in and loads the profile from `/users/me`.
    ///
    /// The session holds the `/users/me` identity, not anything from the login
    /// response. A rejected login clears the session.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the credentials are malformed (nothing is sent)
    /// - [`Error::InvalidCredentials`] if the auth service rejects them
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile> {
        validation::validate_credentials(credentials)?;

        match self.authenticate(credentials).await {
            Ok(user) => {
                info!(target = "session.auth", user_id = user.id, "logged in");
                self.session.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(err) => {
                warn!(target = "session.auth", email = %credentials.email, error = %err, "login failed");
                self.session.clear();
                Err(err)
            }
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
        let spec = RequestSpec::post(endpoints::LOGIN)
            .json(credentials)?
            .skip_refresh();

        match self.request(&spec).await {
            Ok(response) => {
                debug!(target = "session.auth", message = %response.message(), "login accepted");
            }
            Err(Error::Resource { status, message }) if is_rejection(status) => {
                return Err(Error::InvalidCredentials(message));
            }
            Err(err) => return Err(err),
        }

        self.fetch_current_user().await
    }

    /// Signs out. The local session is cleared even when the server call fails.
    ///
    /// # Errors
    ///
    /// Returns the server or transport error after the session was cleared.
    pub async fn logout(&self) -> Result<()> {
        let spec = RequestSpec::post(endpoints::LOGOUT).skip_refresh();
        let result = self.request(&spec).await.map(|_| ());
        self.session.clear();

        match &result {
            Ok(()) => info!(target = "session.auth", "logged out"),
            Err(err) => {
                warn!(target = "session.auth", error = %err, "server logout failed; local session cleared")
            }
        }
        result
    }

    /// Fetches the identity behind the current cookies without touching the session.
    pub async fn fetch_current_user(&self) -> Result<UserProfile> {
        self.get_json(endpoints::CURRENT_USER).await
    }

    /// Startup check: restores the session from existing cookies.
    ///
    /// Returns `Ok(None)` when there is no recoverable session. Transient
    /// failures (network, 5xx) are returned as errors and leave the session as
    /// it was.
    pub async fn restore_session(&self) -> Result<Option<UserProfile>> {
        let _loading = self.session.begin_startup_check();

        match self.fetch_current_user().await {
            Ok(user) => {
                debug!(target = "session.auth", user_id = user.id, "session restored");
                self.session.set_user(Some(user.clone()));
                Ok(Some(user))
            }
            Err(Error::AuthExpired(_)) | Err(Error::Resource { status: 401, .. }) => {
                debug!(target = "session.auth", "no session to restore");
                self.session.clear();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Creates an account and returns the server's confirmation message.
    pub async fn register(&self, request: &RegisterRequest) -> Result<String> {
        validation::validate_registration(request)?;
        let spec = RequestSpec::post(endpoints::REGISTER)
            .json(request)?
            .skip_refresh();
        Ok(self.request(&spec).await?.message())
    }

    /// Requests a password-reset email and returns the server's message.
    pub async fn forgot_password(&self, email: &str) -> Result<String> {
        validation::validate_email(email)?;
        let spec = RequestSpec::get(endpoints::FORGOT_PASSWORD)
            .query("email", email)
            .skip_refresh();
        Ok(self.request(&spec).await?.message())
    }
}

/// Statuses the auth service uses to reject a login attempt.
fn is_rejection(status: u16) -> bool {
    matches!(status, 400 | 401 | 403 | 404)
}

/// Every refresh failure reaches callers as [`Error::AuthExpired`].
fn into_refresh_failure(err: Error) -> Error {
    match err {
        Error::AuthExpired(_) => err,
        other => Error::AuthExpired(other.to_string()),
    }
}
