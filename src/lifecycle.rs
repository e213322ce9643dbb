//! Request lifecycle hook: flush after dispatch, clear at teardown.
//!
//! Ordering per request:
//!
//! 1. A fresh [`ContextSlot`] is entered; nothing is bound yet.
//! 2. The inner service runs (routing, extractors, handler, error-to-response).
//! 3. If it returned a response that is not marked [`HandlerFailed`], the
//!    bound session is flushed. A flush error replaces the response with the
//!    unit of work's error response, before anything is sent.
//! 4. The [`TeardownGuard`] drops: the session is discarded and the slot
//!    cleared. This also runs when the handler panics or the request future
//!    is dropped mid-flight.

use std::panic::AssertUnwindSafe;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use tracing::debug;

use crate::error::HandlerFailed;
use crate::session::{ContextSlot, ScopedBinding};
use crate::unit_of_work::UnitOfWork;

/// How a request left the lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Handler succeeded and the session flushed.
    Completed(StatusCode),
    /// Handler returned an error response; flush skipped.
    HandlerFailed(StatusCode),
    /// Flush failed; the error response was returned instead.
    FlushFailed,
    /// Handler panicked; flush skipped.
    Panicked,
    /// The request future was dropped before finishing.
    Cancelled,
}

/// Clears the request's slot exactly once, whatever the exit path.
#[derive(Debug)]
pub struct TeardownGuard {
    slot: ContextSlot,
    outcome: RequestOutcome,
}

impl TeardownGuard {
    pub fn new(slot: ContextSlot) -> Self {
        Self {
            slot,
            outcome: RequestOutcome::Cancelled,
        }
    }

    pub fn set_outcome(&mut self, outcome: RequestOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(session) = self.slot.take() else {
            return;
        };
        let dropped = session.discard();
        if dropped > 0 {
            debug!(
                name: "uow.teardown.discarded",
                dropped,
                outcome = ?self.outcome,
                "pending mutations discarded"
            );
        }
    }
}

/// Middleware installed by [`UnitOfWork::attach`].
pub async fn unit_of_work_middleware<B: ScopedBinding>(
    State(uow): State<UnitOfWork<B>>,
    request: Request,
    next: Next,
) -> Response {
    let slot = ContextSlot::new();
    let binding = uow.binding().clone();
    binding
        .scope(slot.clone(), dispatch(uow, slot, request, next))
        .await
}

async fn dispatch<B: ScopedBinding>(
    uow: UnitOfWork<B>,
    slot: ContextSlot,
    request: Request,
    next: Next,
) -> Response {
    let mut teardown = TeardownGuard::new(slot.clone());

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            teardown.set_outcome(RequestOutcome::Panicked);
            drop(teardown);
            std::panic::resume_unwind(panic);
        }
    };

    if response.extensions().get::<HandlerFailed>().is_some() {
        debug!(
            name: "uow.flush.skipped",
            status = response.status().as_u16(),
            "handler failed, skipping flush"
        );
        teardown.set_outcome(RequestOutcome::HandlerFailed(response.status()));
        return response;
    }

    match uow.flush_slot(&slot).await {
        Ok(_) => {
            teardown.set_outcome(RequestOutcome::Completed(response.status()));
            response
        }
        Err(err) => {
            teardown.set_outcome(RequestOutcome::FlushFailed);
            uow.render_flush_error(err)
        }
    }
}
