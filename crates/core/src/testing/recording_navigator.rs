use parking_lot::Mutex;

use crate::navigation::{LoginRedirect, Navigator};

/// Navigator that keeps every redirect it was asked to perform.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<LoginRedirect> {
        self.redirects.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.redirects.lock().len()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self, redirect: LoginRedirect) {
        self.redirects.lock().push(redirect);
    }
}
