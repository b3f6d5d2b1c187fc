//! In-memory session state and its read-only view for the UI.

use parking_lot::Mutex;
use storefront_protocol::UserProfile;
use tokio::sync::watch;

/// Read-only view of the session handed to the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Identity from the last successful `/users/me` check.
    ///
    /// `Some` does not mean the access token is still valid, only that the
    /// last identity check succeeded.
    pub current_user: Option<UserProfile>,
    /// True while the startup check or an in-flight refresh is unresolved.
    pub auth_loading: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    /// Guard used by protected views: signed in and holding one of `roles`.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.current_user
            .as_ref()
            .is_some_and(|user| user.has_any_role(roles))
    }

    pub fn is_admin(&self) -> bool {
        self.current_user.as_ref().is_some_and(UserProfile::is_admin)
    }
}

/// Owner of the session. Writes go through the client's login, logout,
/// startup check and teardown paths only.
///
/// A new store reports `auth_loading` until the identity is first known:
/// the startup check settles (whatever its result) or a user is set or
/// cleared by login or logout.
pub(crate) struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
    loading: Mutex<Loading>,
}

struct Loading {
    depth: usize,
    awaiting_startup: bool,
}

impl Loading {
    fn active(&self) -> bool {
        self.depth > 0 || self.awaiting_startup
    }
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            current_user: None,
            auth_loading: true,
        });
        Self {
            tx,
            loading: Mutex::new(Loading {
                depth: 0,
                awaiting_startup: true,
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Replaces the signed-in identity wholesale.
    pub(crate) fn set_user(&self, user: Option<UserProfile>) {
        let mut loading = self.loading.lock();
        loading.awaiting_startup = false;
        let active = loading.active();
        self.tx.send_modify(|snapshot| {
            snapshot.current_user = user;
            snapshot.auth_loading = active;
        });
    }

    pub(crate) fn clear(&self) {
        self.set_user(None);
    }

    /// Marks auth as loading until the returned guard is dropped. Nested
    /// guards (a refresh inside the startup check) keep the flag set until
    /// the outermost one ends.
    pub(crate) fn begin_loading(&self) -> LoadingGuard<'_> {
        self.enter(false)
    }

    /// Like [`begin_loading`](Self::begin_loading), and ends the startup
    /// wait when the guard drops.
    pub(crate) fn begin_startup_check(&self) -> LoadingGuard<'_> {
        self.enter(true)
    }

    fn enter(&self, startup: bool) -> LoadingGuard<'_> {
        let mut loading = self.loading.lock();
        loading.depth += 1;
        self.publish_loading(loading.active());
        LoadingGuard {
            store: self,
            startup,
        }
    }

    fn end_loading(&self, startup: bool) {
        let mut loading = self.loading.lock();
        loading.depth = loading.depth.saturating_sub(1);
        if startup {
            loading.awaiting_startup = false;
        }
        self.publish_loading(loading.active());
    }

    fn publish_loading(&self, active: bool) {
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.auth_loading != active;
            snapshot.auth_loading = active;
            changed
        });
    }
}

pub(crate) struct LoadingGuard<'a> {
    store: &'a SessionStore,
    startup: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.end_loading(self.startup);
    }
}
