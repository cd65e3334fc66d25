//! ABOUTME: Signal/query plumbing shared by a running workflow and its
//! ABOUTME: external handle — cancellation plus an arbitrary status value

use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle held by callers outside the workflow (the worker, a test
/// harness) to send the `request_cancellation` signal and run the
/// `get_status`/`get_detailed_status` queries without reaching into the
/// workflow's internal state machine.
#[derive(Clone)]
pub struct WorkflowHandle<S: Clone> {
    cancellation: CancellationToken,
    status: Arc<RwLock<S>>,
}

impl<S: Clone> WorkflowHandle<S> {
    #[must_use]
    pub fn new(initial_status: S) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            status: Arc::new(RwLock::new(initial_status)),
        }
    }

    /// The `request_cancellation` signal: idempotent, fires at most once.
    pub fn request_cancellation(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Lets the workflow body await cancellation alongside other futures
    /// (e.g. `tokio::select!` against an activity future).
    #[must_use]
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFutureOwned {
        self.cancellation.clone().cancelled_owned()
    }

    pub fn set_status(&self, status: S) {
        *self.status.write() = status;
    }

    /// The `get_status`/`get_detailed_status` query.
    #[must_use]
    pub fn status(&self) -> S {
        self.status.read().clone()
    }
}
