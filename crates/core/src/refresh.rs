//! Single-flight coordination of access-token refreshes.
//!
//! The first request to observe a 401 while no refresh is running becomes
//! the *leader* and performs the refresh. Requests that observe a 401 while
//! the refresh is running park on a oneshot channel in the pending queue and
//! are released, in arrival order, with the leader's outcome.
//!
//! # Generations
//!
//! Every settled refresh bumps a generation counter. A request records the
//! generation before it is sent; if its 401 arrives after a refresh for that
//! generation has already settled, the stale token has been dealt with and the
//! request takes the settled outcome instead of starting a second refresh.
//!
//! The trade-off: a request sent before a successful refresh whose 401 comes
//! from a *later* expiry is replayed once with cookies that are already stale
//! and returns that 401 without refreshing. The next request sent under the
//! new generation refreshes normally.
//!
//! # Abandoned refreshes
//!
//! If the leader is dropped before settling (a timeout or `select!` around
//! the request), nothing is known about the refresh token. The lease hands
//! off instead of failing: state returns to `Idle` with the generation and
//! last outcome untouched, and every parked request is told to
//! [`Release::Retry`], so the first of them to re-enter [`RefreshCoordinator::admit`]
//! leads a fresh refresh.
//!
//! # Locking
//!
//! State, generation and queue sit behind one `parking_lot::Mutex`. The flag
//! check and update happen in a single critical section, and the lock is
//! never held across an `.await`.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;

/// Outcome handed to every request queued behind a refresh.
pub type RefreshOutcome = Result<()>;

/// Whether a refresh is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
}

/// What a parked request is woken with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Settled(RefreshOutcome),
    /// The leader went away before settling; admit again.
    Retry,
}

/// What a request that received a 401 should do next.
pub enum Admission<'a> {
    /// No refresh in flight: perform it and settle the lease.
    Lead(RefreshLease<'a>),
    /// A refresh is in flight: await its release.
    Wait(oneshot::Receiver<Release>),
    /// A refresh settled after this request was sent: reuse its outcome.
    Settled(RefreshOutcome),
}

#[derive(Default)]
struct Inner {
    state: RefreshState,
    generation: u64,
    last_outcome: Option<RefreshOutcome>,
    pending: VecDeque<oneshot::Sender<Release>>,
}

/// Owns [`RefreshState`] and the pending request queue for one client.
#[derive(Default)]
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    /// Number of refreshes settled so far.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Requests currently parked behind the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Decides the role of a request that was sent under `observed` and got a 401.
    pub fn admit(&self, observed: u64) -> Admission<'_> {
        let mut inner = self.inner.lock();
        match inner.state {
            RefreshState::Refreshing => {
                let (tx, rx) = oneshot::channel();
                inner.pending.push_back(tx);
                debug!(target = "session.refresh", queued = inner.pending.len(), "waiting on in-flight refresh");
                Admission::Wait(rx)
            }
            RefreshState::Idle if inner.generation != observed => {
                let outcome = inner.last_outcome.clone().unwrap_or(Ok(()));
                debug!(
                    target = "session.refresh",
                    observed,
                    generation = inner.generation,
                    ok = outcome.is_ok(),
                    "refresh already settled for this request"
                );
                Admission::Settled(outcome)
            }
            RefreshState::Idle => {
                inner.state = RefreshState::Refreshing;
                debug!(target = "session.refresh", generation = inner.generation, "refresh started");
                Admission::Lead(RefreshLease {
                    coordinator: self,
                    settled: false,
                })
            }
        }
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = RefreshState::Idle;
            inner.generation += 1;
            inner.last_outcome = Some(outcome.clone());
            std::mem::take(&mut inner.pending)
        };

        let released = wake(waiters, &Release::Settled(outcome.clone()));
        debug!(target = "session.refresh", released, ok = outcome.is_ok(), "refresh settled");
        released
    }

    fn abandon(&self) -> usize {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.pending)
        };

        let released = wake(waiters, &Release::Retry);
        debug!(target = "session.refresh", released, "refresh abandoned, waiters re-admitted");
        released
    }
}

fn wake(waiters: VecDeque<oneshot::Sender<Release>>, release: &Release) -> usize {
    let count = waiters.len();
    for waiter in waiters {
        // Receiver gone means the waiting request was dropped.
        let _ = waiter.send(release.clone());
    }
    count
}

/// Leadership of the in-flight refresh.
///
/// Dropping an unsettled lease hands the refresh off to the parked requests,
/// so none of them waits on a leader that went away.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Returns to `Idle` and releases the queue. Returns how many waiters were released.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.abandon();
        }
    }
}
