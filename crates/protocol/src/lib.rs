//! Wire types for the storefront REST API.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! storefront backend: auth payloads, the user profile returned by
//! `/users/me`, the uniform `{ "message": ... }` body and the endpoint paths
//! the session client treats specially.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small accessors
//! * 1:1 with the backend: Field names match the JSON the server emits
//! * Stable: Changes only when the backend contract changes
//!
//! Request coordination and session state are built on top of these types in
//! `storefront-session`.

pub mod auth;
pub mod endpoints;
pub mod user;

pub use auth::*;
pub use user::*;
