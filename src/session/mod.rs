//! Session model and storage.
//!
//! This module provides session identification, lifecycle state, metadata,
//! the [`SessionStore`] adapter trait and an in-memory implementation.

mod handle;
mod id;
mod memory;
mod metadata;
mod state;
mod store;

pub use handle::Session;
pub use id::{default_identifier_factory, IdentifierFactory, SessionId};
pub use memory::InMemorySessionStore;
pub use metadata::{ImmutableSession, SessionMetaData};
pub use state::SessionState;
pub use store::SessionStore;
