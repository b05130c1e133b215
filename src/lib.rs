//! # distributable-session
//!
//! Distributable web-session manager with request-scoped transactional
//! batches.
//!
//! Every session read or write happens inside a [`Batch`], a unit of work
//! against the backing [`SessionStore`]. A [`RequestBatchWrapper`] scopes
//! one batch to each request: the batch commits when the handler succeeds
//! and rolls back when it fails, and whatever batch was bound to the
//! calling [`BatchContext`] before the request is restored afterwards.
//!
//! ## Features
//!
//! - **Explicit batch contexts**: no thread-locals; batches follow the
//!   [`BatchContext`] passed through the call chain
//! - **Bounded sessions**: an atomic active-session counter rejects creation
//!   past the configured maximum
//! - **Statistics**: created, expired and invalidated counts with alive-time
//!   tracking
//! - **Lifecycle listeners**: creation and destruction notifications, with
//!   expiration reported exactly once
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use distributable_session::{
//!     BatchContext, DistributableSessionManagerFactory, InMemorySessionStore, ManagerConfig,
//! };
//!
//! fn main() -> distributable_session::Result<()> {
//!     let store = Arc::new(InMemorySessionStore::new());
//!     let manager = DistributableSessionManagerFactory::new(store)
//!         .create_session_manager(ManagerConfig::new("shop"));
//!
//!     let ctx = BatchContext::new();
//!     manager.request_wrapper().call(&ctx, |ctx| {
//!         let session = manager.create_session(ctx, None)?;
//!         session.set_attribute("user", serde_json::json!("alice"))?;
//!         println!("Session {} created", session.id());
//!         Ok(())
//!     })
//! }
//! ```

pub mod api;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod session;
pub mod statistics;
pub mod wrapper;

// Re-export commonly used types
pub use batch::{Batch, BatchContext, BatchId, BatchOutcome, BatchScope, BatchState, Batcher};
pub use error::{Result, SessionError};
pub use listener::{ExpirationCause, ExpirationListener, SessionListener, SessionListeners};
pub use manager::{DistributableSessionManager, DistributableSessionManagerFactory, ManagerConfig};
pub use session::{
    ImmutableSession, InMemorySessionStore, Session, SessionId, SessionMetaData, SessionState,
    SessionStore,
};
pub use statistics::{Statistics, StatisticsSnapshot};
pub use wrapper::RequestBatchWrapper;
