//! Axum middleware running each request inside a request batch.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::RequestBatchWrapper;
use crate::api::types::ErrorResponse;
use crate::batch::BatchContext;
use crate::error::SessionError;

/// Why the request batch did not commit.
enum Outcome {
    /// The handler produced a server error; its response is passed through.
    Failed(Response),
    /// Batch coordination or the commit itself failed.
    Batch(SessionError),
}

impl From<SessionError> for Outcome {
    fn from(e: SessionError) -> Self {
        Self::Batch(e)
    }
}

/// Batch middleware for axum.
///
/// Installs a [`BatchContext`] in the request extensions, reusing one that
/// is already present so nested dispatch nests its batches, and runs the
/// rest of the stack through [`RequestBatchWrapper::call_async`]. Responses
/// with a 5xx status roll the request batch back.
pub async fn batch_middleware(
    State(wrapper): State<RequestBatchWrapper>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<BatchContext>()
        .cloned()
        .unwrap_or_default();
    request.extensions_mut().insert(ctx.clone());

    let result = wrapper
        .call_async(ctx, |_| async move {
            let response = next.run(request).await;
            if response.status().is_server_error() {
                Err(Outcome::Failed(response))
            } else {
                Ok(response)
            }
        })
        .await;

    match result {
        Ok(response) | Err(Outcome::Failed(response)) => response,
        Err(Outcome::Batch(e)) => {
            error!(error = %e, "request batch failed");
            ErrorResponse::from_session_error(&e).into_response()
        }
    }
}
