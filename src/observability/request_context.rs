//! Request context propagation for correlation IDs.
//!
//! Every ingest runs inside a [`RequestContext`] so log lines emitted deep in
//! the parser, breaker, or dedup store can be tied back to one upload.

use std::cell::RefCell;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Per-request context with correlation ID.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Creates a new request context with a generated, time-ordered ID.
    #[must_use]
    pub fn new() -> Self {
        Self::from_id(Uuid::now_v7().to_string())
    }

    /// Creates a new request context with an existing request ID.
    #[must_use]
    pub fn from_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            started: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

tokio::task_local! {
    static TASK_CONTEXT: RequestContext;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<RequestContext>> = const { RefCell::new(None) };
}

/// Guard that restores the previous thread-local context on drop.
pub struct RequestContextGuard {
    previous: Option<RequestContext>,
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        THREAD_CONTEXT.with(|slot| {
            *slot.borrow_mut() = self.previous.take();
        });
    }
}

/// Enters a request context for synchronous flows such as the CLI commands.
#[must_use]
pub fn enter_request_context(context: RequestContext) -> RequestContextGuard {
    let previous = THREAD_CONTEXT.with(|slot| slot.borrow_mut().replace(context));
    RequestContextGuard { previous }
}

/// Runs `fut` with `context` as the current request, inside a span named
/// `operation` that carries the request ID.
pub async fn scope_request_context<F, T>(
    context: RequestContext,
    operation: &'static str,
    fut: F,
) -> T
where
    F: Future<Output = T>,
{
    let span = tracing::info_span!("request", operation, request_id = %context.request_id());
    TASK_CONTEXT.scope(context, fut.instrument(span)).await
}

/// Returns the current request ID, if set.
#[must_use]
pub fn current_request_id() -> Option<String> {
    if let Ok(id) = TASK_CONTEXT.try_with(|ctx| ctx.request_id.clone()) {
        return Some(id);
    }

    THREAD_CONTEXT.with(|slot| slot.borrow().as_ref().map(|ctx| ctx.request_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_context_guard_propagates_request_id() {
        let context = RequestContext::from_id("thread-test");
        let guard = enter_request_context(context);
        assert_eq!(current_request_id().as_deref(), Some("thread-test"));
        drop(guard);
        assert!(current_request_id().is_none());
    }

    #[test]
    fn test_nested_guards_restore_outer_context() {
        let _outer = enter_request_context(RequestContext::from_id("outer"));
        {
            let _inner = enter_request_context(RequestContext::from_id("inner"));
            assert_eq!(current_request_id().as_deref(), Some("inner"));
        }
        assert_eq!(current_request_id().as_deref(), Some("outer"));
    }

    #[tokio::test]
    async fn test_scope_request_context_propagates_across_await() {
        let context = RequestContext::from_id("async-test");
        let observed = scope_request_context(context, "test", async {
            tokio::task::yield_now().await;
            current_request_id()
        })
        .await;
        assert_eq!(observed.as_deref(), Some("async-test"));
    }

    #[test]
    fn test_task_context_wins_over_thread_guard() {
        let _guard = enter_request_context(RequestContext::from_id("thread"));
        let observed = tokio_test::block_on(scope_request_context(
            RequestContext::from_id("task"),
            "test",
            async { current_request_id() },
        ));
        assert_eq!(observed.as_deref(), Some("task"));
        assert_eq!(current_request_id().as_deref(), Some("thread"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.request_id().len(), 36);
    }
}
