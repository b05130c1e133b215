//! Request-scoped batch wrapping.
//!
//! Every request handler runs inside its own batch. The wrapper parks any
//! batch already bound to the context, starts a fresh one, runs the handler,
//! commits or rolls back, and then puts the parked batch back. Cleanup runs
//! on every exit path, including panics and dropped futures, because the
//! binding lives in a [`BatchScope`](crate::batch::BatchScope).

mod middleware;

use std::future::Future;

use tracing::{debug, warn};

pub use middleware::batch_middleware;

use crate::batch::{Batch, BatchContext, Batcher};
use crate::error::SessionError;

/// Runs handlers inside a request batch.
#[derive(Debug, Clone)]
pub struct RequestBatchWrapper {
    batcher: Batcher,
}

impl RequestBatchWrapper {
    pub fn new(batcher: Batcher) -> Self {
        Self { batcher }
    }

    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    /// Run `handler` inside a new batch bound to `ctx`.
    ///
    /// The batch commits if the handler succeeds and rolls back if it fails.
    /// A handler error takes precedence over a failure to release the scope.
    pub fn call<T, E, F>(&self, ctx: &BatchContext, handler: F) -> Result<T, E>
    where
        F: FnOnce(&BatchContext) -> Result<T, E>,
        E: From<SessionError>,
    {
        let mut scope = self.batcher.resume_batch(ctx, None)?;
        let batch = self.batcher.create_batch(ctx)?;

        let result = handler(ctx);
        let result = Self::finish(&batch, result);
        Self::release(result, scope.exit())
    }

    /// Async variant of [`call`](Self::call).
    ///
    /// Dropping the returned future before it completes rolls the request
    /// batch back and restores the parked batch.
    pub async fn call_async<T, E, F, Fut>(&self, ctx: BatchContext, handler: F) -> Result<T, E>
    where
        F: FnOnce(BatchContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SessionError>,
    {
        let mut scope = self.batcher.resume_batch(&ctx, None)?;
        let batch = self.batcher.create_batch(&ctx)?;

        let result = handler(ctx).await;
        let result = Self::finish(&batch, result);
        Self::release(result, scope.exit())
    }

    /// Turn `handler` into a reusable function that always runs wrapped.
    pub fn wrap<T, E, F>(&self, handler: F) -> impl Fn(&BatchContext) -> Result<T, E>
    where
        F: Fn(&BatchContext) -> Result<T, E>,
        E: From<SessionError>,
    {
        let wrapper = self.clone();
        move |ctx: &BatchContext| wrapper.call(ctx, &handler)
    }

    fn finish<T, E>(batch: &Batch, result: Result<T, E>) -> Result<T, E>
    where
        E: From<SessionError>,
    {
        match result {
            Ok(value) => {
                batch.close()?;
                Ok(value)
            }
            Err(e) => {
                debug!(batch = %batch.id(), "request handler failed, rolling back");
                batch.rollback();
                Err(e)
            }
        }
    }

    fn release<T, E>(result: Result<T, E>, released: crate::Result<()>) -> Result<T, E>
    where
        E: From<SessionError>,
    {
        match (result, released) {
            (Err(e), Err(scope)) => {
                warn!(error = %scope, "batch scope release failed after handler error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(scope)) => Err(scope.into()),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchState, RecordingTx, Transactional};
    use std::sync::Arc;

    fn wrapper() -> (RequestBatchWrapper, Arc<RecordingTx>) {
        let tx = Arc::new(RecordingTx::default());
        let dyn_tx: Arc<dyn Transactional> = tx.clone();
        (RequestBatchWrapper::new(Batcher::new(dyn_tx)), tx)
    }

    #[test]
    fn test_success_commits() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();

        let batch = wrapper
            .call(&ctx, |ctx| {
                Ok::<_, SessionError>(ctx.active_batch().expect("request batch bound"))
            })
            .unwrap();

        assert_eq!(batch.state(), BatchState::Committed);
        assert!(ctx.active_batch().is_none());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_error_rolls_back_and_restores_ambient() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();
        let ambient = wrapper.batcher().create_batch(&ctx).unwrap();

        let mut inner = None;
        let result: Result<(), SessionError> = wrapper.call(&ctx, |ctx| {
            inner = ctx.active_batch();
            Err(SessionError::StoreUnavailable("boom".into()))
        });

        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
        let inner = inner.unwrap();
        assert_ne!(inner, ambient);
        assert_eq!(inner.state(), BatchState::RolledBack);
        assert_eq!(ctx.active_batch(), Some(ambient.clone()));
        assert_eq!(ambient.state(), BatchState::Active);
        ambient.close().unwrap();
    }

    #[test]
    fn test_commit_failure_surfaces() {
        let (wrapper, tx) = wrapper();
        tx.fail_commit
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let ctx = BatchContext::new();

        let result = wrapper.call(&ctx, |_| Ok::<_, SessionError>(()));
        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
        assert!(ctx.active_batch().is_none());
    }

    #[test]
    fn test_panic_restores_context() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();
        let ambient = wrapper.batcher().create_batch(&ctx).unwrap();

        let inner = Arc::new(std::sync::Mutex::new(None));
        let captured = Arc::clone(&inner);
        let ctx_clone = ctx.clone();
        let wrapper_clone = wrapper.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _: Result<(), SessionError> = wrapper_clone.call(&ctx_clone, |ctx| {
                *captured.lock().unwrap() = ctx.active_batch();
                panic!("handler exploded");
            });
        }));

        assert!(outcome.is_err());
        let inner = inner.lock().unwrap().take().unwrap();
        assert_eq!(inner.state(), BatchState::RolledBack);
        assert_eq!(ctx.active_batch(), Some(ambient.clone()));
        assert_eq!(ctx.depth(), 0);
        ambient.close().unwrap();
    }

    #[test]
    fn test_nested_calls() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();

        let (outer, inner) = wrapper
            .call(&ctx, |ctx| {
                let outer = ctx.active_batch().unwrap();
                let inner = wrapper.call(ctx, |ctx| {
                    Ok::<_, SessionError>(ctx.active_batch().unwrap())
                })?;
                assert_eq!(ctx.active_batch(), Some(outer.clone()));
                Ok::<_, SessionError>((outer, inner))
            })
            .unwrap();

        assert_ne!(outer, inner);
        assert_eq!(outer.state(), BatchState::Committed);
        assert_eq!(inner.state(), BatchState::Committed);
    }

    #[test]
    fn test_wrap_reusable() {
        let (wrapper, _) = wrapper();
        let handler = wrapper.wrap(|ctx: &BatchContext| {
            Ok::<_, SessionError>(ctx.active_batch().map(|b| b.id()))
        });
        let ctx = BatchContext::new();

        let first = handler(&ctx).unwrap();
        let second = handler(&ctx).unwrap();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_call_async_commits() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();

        let batch = wrapper
            .call_async(ctx.clone(), |ctx| async move {
                tokio::task::yield_now().await;
                Ok::<_, SessionError>(ctx.active_batch().unwrap())
            })
            .await
            .unwrap();

        assert_eq!(batch.state(), BatchState::Committed);
        assert!(ctx.active_batch().is_none());
    }

    #[tokio::test]
    async fn test_dropped_future_rolls_back() {
        let (wrapper, _) = wrapper();
        let ctx = BatchContext::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let fut = wrapper.call_async(ctx.clone(), |ctx| async move {
            let _ = tx.send(ctx.active_batch().unwrap());
            std::future::pending::<Result<(), SessionError>>().await
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), fut).await;
        assert!(timed_out.is_err());

        let inner = rx.await.unwrap();
        assert_eq!(inner.state(), BatchState::RolledBack);
        assert!(ctx.active_batch().is_none());
        assert_eq!(ctx.depth(), 0);
    }
}
