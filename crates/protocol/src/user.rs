//! Profile snapshot returned by `GET /users/me`.

use serde::{Deserialize, Serialize};

/// Role name granting access to the admin console.
pub const ROLE_ADMIN: &str = "ADMIN";

/// Identity of the signed-in user as reported by the backend.
///
/// ```json
/// {
///   "id": 7,
///   "fullName": "Nguyen Van A",
///   "email": "a@example.com",
///   "phone": "0900000000",
///   "address": null,
///   "createdAt": "2025-03-01T10:00:00",
///   "roles": ["CUSTOMER"],
///   "verified": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, alias = "isVerified")]
    pub verified: bool,
}

impl UserProfile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// True when the user holds at least one of `roles`, or when `roles` is empty.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.is_empty() || roles.iter().any(|role| self.has_role(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}
