//! Auth service paths, relative to the API base URL.

/// Exchanges credentials for the `auth_token` / `refresh_token` cookies.
pub const LOGIN: &str = "/auth/login";
/// Rotates the access cookie using the HTTP-only refresh cookie.
pub const REFRESH_TOKEN: &str = "/auth/refresh-token";
/// Invalidates the refresh token server-side and clears both cookies.
pub const LOGOUT: &str = "/auth/logout";
pub const REGISTER: &str = "/auth/register";
pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
/// Profile of the identity behind the current access cookie.
pub const CURRENT_USER: &str = "/users/me";

/// Client-side route the UI shows when the session cannot be recovered.
pub const LOGIN_ROUTE: &str = "/auth/login";

/// Returns true when `path` targets the refresh endpoint.
///
/// Query strings and trailing slashes are ignored so `/auth/refresh-token/`
/// and `/auth/refresh-token?x=1` are both recognised.
pub fn is_refresh_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_end_matches('/').ends_with(REFRESH_TOKEN)
}
