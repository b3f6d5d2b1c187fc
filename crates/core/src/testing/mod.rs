//! In-memory collaborators for exercising [`SessionClient`](crate::SessionClient)
//! without a network: a scripted auth/resource backend and a navigator that
//! records redirects.

mod fake_backend;
mod recording_navigator;

pub use fake_backend::{FakeBackend, SentRequest};
pub use recording_navigator::RecordingNavigator;
