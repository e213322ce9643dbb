//! Request-scoped sessions.
//!
//! A session accumulates pending writes for exactly one request. It is created
//! lazily the first time a handler records a write (or asks for the current
//! session) and is dropped when the request's context ends.
//!
//! # Architecture
//!
//! - [`SessionStore`]: ordered queue of pending mutations with flush/discard
//! - [`SessionBinding`]: get/set access to the calling request's session
//! - [`TaskLocalBinding`]: the default binding, one slot per tokio task scope
//!
//! # Example
//!
//! ```rust
//! use axum_unit_of_work::session::{ContextSlot, ScopedBinding, SessionBinding, TaskLocalBinding};
//!
//! # tokio_test_block_on(async {
//! let binding = TaskLocalBinding;
//! binding
//!     .scope(ContextSlot::new(), async move {
//!         assert!(binding.get_current().unwrap().is_none());
//!         let session = binding.get_or_create_current_session().unwrap();
//!         assert!(session.is_empty());
//!     })
//!     .await;
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod binding;
mod store;

pub use binding::{ContextSlot, ScopedBinding, SessionBinding, TaskLocalBinding};
pub use store::SessionStore;
