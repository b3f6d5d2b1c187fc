//! Redirect hook between the session client and the UI router.

use storefront_protocol::UserProfile;

pub const HOME_ROUTE: &str = "/";
pub const ADMIN_DASHBOARD_ROUTE: &str = "/admin/dashboard";

/// Navigation the UI performs when the session cannot be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Login route to navigate to.
    pub to: String,
    /// Location the user was on, so navigation can resume after login.
    pub from: Option<String>,
}

/// Implemented by the UI layer's router.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, redirect: LoginRedirect);
}

/// Navigator for headless use; the redirect is only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect_to_login(&self, redirect: LoginRedirect) {
        tracing::info!(target = "session.auth", to = %redirect.to, from = ?redirect.from, "login required");
    }
}

/// Where to send the user after a successful login.
///
/// Admins land on the dashboard; everyone else resumes at `from` or the home page.
pub fn post_login_destination(user: &UserProfile, from: Option<&str>) -> String {
    if user.is_admin() {
        return ADMIN_DASHBOARD_ROUTE.to_string();
    }
    from.filter(|path| !path.is_empty())
        .unwrap_or(HOME_ROUTE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[&str]) -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": 3,
            "email": "c@example.com",
            "roles": roles,
        }))
        .unwrap()
    }

    #[test]
    fn admin_goes_to_dashboard() {
        assert_eq!(
            post_login_destination(&user(&["ADMIN"]), Some("/orders")),
            ADMIN_DASHBOARD_ROUTE
        );
    }

    #[test]
    fn customer_resumes_previous_location() {
        assert_eq!(post_login_destination(&user(&["CUSTOMER"]), Some("/orders")), "/orders");
        assert_eq!(post_login_destination(&user(&["CUSTOMER"]), Some("")), "/");
        assert_eq!(post_login_destination(&user(&[]), None), "/");
    }
}
