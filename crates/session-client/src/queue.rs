//! Parking lot for requests that hit a 401 while a renewal is running
//!
//! The first failing request becomes the leader and performs the renewal.
//! Everyone else parks until it settles and is then released in arrival
//! order with the same outcome. Each renewal is tagged with an epoch so an
//! outcome that lands after a reset cannot release a later renewal's
//! waiters.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorCategory};

/// Outcome of a renewal: the new credential generation, or the error every
/// parked request is rejected with.
pub type RenewalOutcome = Result<u64, ApiError>;

/// A request waiting on the renewal.
#[derive(Debug)]
pub struct PendingRequest {
    pub request_id: String,
    resume: oneshot::Sender<RenewalOutcome>,
}

/// Role assigned by `RetryQueue::enter`.
#[derive(Debug)]
pub enum Ticket<'a> {
    /// Run the renewal, then settle the lease
    Leader(RenewalLease<'a>),
    /// Wait for the leader's outcome
    Parked(oneshot::Receiver<RenewalOutcome>),
}

/// Held by the leader for the duration of a renewal.
///
/// Dropping the lease unsettled (the leader's future was cancelled) rejects
/// every parked request and frees the queue for the next 401.
#[derive(Debug)]
pub struct RenewalLease<'a> {
    queue: &'a RetryQueue,
    epoch: u64,
    settled: bool,
}

impl RenewalLease<'_> {
    /// False once `RetryQueue::reset` has discarded this renewal.
    pub fn is_current(&self) -> bool {
        let state = self.queue.state();
        state.refreshing && state.epoch == self.epoch
    }

    /// Release every parked request with `outcome`. Returns how many were
    /// released; zero if the renewal was already discarded.
    pub fn settle(mut self, outcome: RenewalOutcome) -> usize {
        self.settled = true;
        self.queue.settle_epoch(self.epoch, outcome)
    }
}

impl Drop for RenewalLease<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let released = self.queue.settle_epoch(
            self.epoch,
            Err(ApiError::network("session renewal was cancelled")
                .with_kind(ErrorCategory::SessionExpired)),
        );
        warn!(epoch = self.epoch, released, "session renewal abandoned before settling");
    }
}

#[derive(Debug, Default)]
struct QueueState {
    refreshing: bool,
    /// Bumped for every new leader and every reset
    epoch: u64,
    pending: VecDeque<PendingRequest>,
}

#[derive(Debug, Default)]
pub struct RetryQueue {
    state: Mutex<QueueState>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the renewal or join the queue behind it.
    pub fn enter(&self, request_id: &str) -> Ticket<'_> {
        let mut state = self.state();
        if !state.refreshing {
            state.refreshing = true;
            state.epoch += 1;
            debug!(request_id, epoch = state.epoch, "leading session renewal");
            return Ticket::Leader(RenewalLease {
                queue: self,
                epoch: state.epoch,
                settled: false,
            });
        }
        let (resume, parked) = oneshot::channel();
        state.pending.push_back(PendingRequest {
            request_id: request_id.to_string(),
            resume,
        });
        debug!(request_id, queued = state.pending.len(), "parked behind session renewal");
        Ticket::Parked(parked)
    }

    /// Settle the renewal started at `epoch`, unless a reset or a later
    /// leader has replaced it.
    fn settle_epoch(&self, epoch: u64, outcome: RenewalOutcome) -> usize {
        let pending = {
            let mut state = self.state();
            if !state.refreshing || state.epoch != epoch {
                debug!(epoch, current = state.epoch, "stale renewal outcome ignored");
                return 0;
            }
            state.refreshing = false;
            std::mem::take(&mut state.pending)
        };
        release(pending, &outcome)
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().refreshing
    }

    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject everything parked and discard any renewal in progress. The
    /// discarded leader's outcome is ignored when it eventually settles.
    pub fn reset(&self, reason: ApiError) -> usize {
        let pending = {
            let mut state = self.state();
            state.refreshing = false;
            state.epoch += 1;
            std::mem::take(&mut state.pending)
        };
        release(pending, &Err(reason))
    }
}

/// Wake parked requests first in first out.
fn release(pending: VecDeque<PendingRequest>, outcome: &RenewalOutcome) -> usize {
    let released = pending.len();
    for request in pending {
        debug!(request_id = %request.request_id, ok = outcome.is_ok(), "releasing parked request");
        // Receiver gone means the caller stopped waiting
        let _ = request.resume.send(outcome.clone());
    }
    released
}
