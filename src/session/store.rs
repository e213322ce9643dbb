//! Pending-mutation accumulator for a single request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::entity::Mutation;
use crate::error::FlushError;
use crate::storage::StorageClient;

/// An ordered queue of pending writes owned by one request.
///
/// Cloning yields another handle to the same queue, so the copy bound in the
/// request context and the copy held by a handler always agree. The mutex is
/// uncontended and is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    pending: Arc<Mutex<VecDeque<Mutation>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Mutation>> {
        // A poisoned queue is still a valid queue; a panicking handler must not
        // prevent teardown from discarding it.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a mutation. Never touches storage.
    pub fn record(&self, mutation: Mutation) {
        debug!(
            name: "uow.session.recorded",
            operation = %mutation.operation(),
            target = %mutation.target(),
            "mutation recorded"
        );
        self.queue().push_back(mutation);
    }

    /// Execute pending mutations in record order.
    ///
    /// Stops at the first failure: that mutation and every one after it stay
    /// queued. Mutations executed before the failure are not rolled back. An
    /// empty session makes no storage call at all.
    pub async fn flush(&self, client: &dyn StorageClient) -> Result<usize, FlushError> {
        let mut executed = 0;
        loop {
            let Some(next) = self.queue().front().cloned() else {
                break;
            };
            if let Err(source) = client.execute(&next).await {
                let pending = self.len();
                warn!(
                    name: "uow.flush.failed",
                    target = %next.target(),
                    executed,
                    pending,
                    error = %source,
                    "flush stopped at failed mutation"
                );
                return Err(FlushError { source, pending });
            }
            self.queue().pop_front();
            executed += 1;
        }
        if executed > 0 {
            debug!(name: "uow.flush.completed", executed, "session flushed");
        }
        Ok(executed)
    }

    /// Drop every pending mutation without executing it. Returns how many were
    /// dropped; calling it on an empty session is a no-op.
    pub fn discard(&self) -> usize {
        let mut queue = self.queue();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Snapshot of the pending queue, oldest first.
    pub fn pending(&self) -> Vec<Mutation> {
        self.queue().iter().cloned().collect()
    }

    /// Whether two handles refer to the same session.
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pending, &other.pending)
    }
}
