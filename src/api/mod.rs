//! HTTP API over the session manager.
//!
//! A thin request-dispatch layer: each request is wrapped in its own batch
//! and handlers use the manager through the request's [`BatchContext`].
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - Deployment information
//! - `GET /api/v1/statistics` - Session statistics (404 when disabled)
//! - `PUT /api/v1/settings/default-timeout` - Change the default timeout
//!
//! ### Sessions
//! - `POST /api/v1/sessions` - Create a session
//! - `GET /api/v1/sessions/{id}` - Get a session
//! - `DELETE /api/v1/sessions/{id}` - Invalidate a session
//! - `PUT /api/v1/sessions/{id}/attributes/{name}` - Set an attribute
//! - `DELETE /api/v1/sessions/{id}/attributes/{name}` - Remove an attribute
//!
//! [`BatchContext`]: crate::batch::BatchContext

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::AppState;
pub use router::{create_router, serve, ServerConfig};
pub use types::{
    ApiError, AttributeResponse, CreateSessionRequest, DefaultTimeoutRequest, ErrorResponse,
    SessionResponse,
};
