//! Local format checks run before anything reaches the auth service.

use std::sync::LazyLock;

use regex::Regex;
use storefront_protocol::{Credentials, RegisterRequest};

use crate::error::{Error, Result};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex should compile"));

// Letters, digits and `@$!%*#?&` only; letter and digit presence is checked separately.
static PASSWORD_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z\d@$!%*#?&]+$").expect("password charset regex should compile")
});

pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(Error::validation("email", "email address is malformed"))
    }
}

/// At least six characters drawn from letters, digits and `@$!%*#?&`,
/// containing at least one letter and one digit.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if !PASSWORD_CHARSET.is_match(password) {
        return Err(Error::validation(
            "password",
            "password may only contain letters, digits and @$!%*#?&",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(Error::validation(
            "password",
            "password must contain a letter and a digit",
        ));
    }
    Ok(())
}

pub fn validate_credentials(credentials: &Credentials) -> Result<()> {
    validate_email(&credentials.email)?;
    validate_password(&credentials.password)
}

pub fn validate_registration(request: &RegisterRequest) -> Result<()> {
    if request.full_name.trim().is_empty() {
        return Err(Error::validation("fullName", "full name is required"));
    }
    validate_email(&request.email)?;
    validate_password(&request.password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(validate_email("khach@shop.vn").is_ok());
        assert!(validate_email("a.b+c@mail.example.com").is_ok());
        for bad in ["", "plain", "a@b", "a b@c.d", "@c.d", "a@@c.d"] {
            assert!(validate_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("abc123").is_ok());
        assert!(validate_password("P@ssw0rd!").is_ok());

        let err = validate_password("ab1").unwrap_err();
        assert!(err.user_message().contains("at least 6"));
        assert!(validate_password("abcdefg").is_err());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("abc 123").is_err());
    }

    #[test]
    fn credentials_report_first_failing_field() {
        let err = validate_credentials(&Credentials::new("nope", "x")).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "email", .. }));

        let err = validate_credentials(&Credentials::new("a@b.co", "x")).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "password", .. }));
    }

    #[test]
    fn registration_requires_name() {
        let request = RegisterRequest {
            full_name: "  ".into(),
            email: "a@b.co".into(),
            password: "abc123".into(),
            phone: None,
            address: None,
        };
        assert!(matches!(
            validate_registration(&request).unwrap_err(),
            Error::Validation { field: "fullName", .. }
        ));
    }
}
