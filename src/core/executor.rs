//! Processing function abstraction.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::error::AppResult;
use super::work::WorkItem;

/// Caller-supplied processing function for a `WorkerPool`.
///
/// Implementations are cloned into every worker thread and invoked
/// concurrently, so they must not rely on exclusive access to shared state.
/// Errors are never interpreted by the pool; they are attached to the
/// item's `JobResult`.
///
/// Output types carry no `Serialize` bound, so results can hold channels,
/// handles and other non-serializable values.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use gated_pool::core::{AppResult, JobProcessor, WorkItem};
///
/// #[derive(Clone)]
/// struct Fetcher;
///
/// #[async_trait]
/// impl JobProcessor<String, usize> for Fetcher {
///     async fn process(&self, item: &WorkItem<String>) -> AppResult<usize> {
///         Ok(item.payload.len())
///     }
/// }
/// ```
#[async_trait]
pub trait JobProcessor<P, O>: Send + Sync + Clone + 'static
where
    P: Send + Sync + 'static,
    O: Send + 'static,
{
    /// Process one item.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread that drives the future on its
    /// own single-threaded tokio runtime; tokio timers and I/O are available.
    async fn process(&self, item: &WorkItem<P>) -> AppResult<O>;
}

/// Adapts a synchronous closure into a `JobProcessor`.
pub struct FnProcessor<F, P, O> {
    func: F,
    _marker: PhantomData<fn(&WorkItem<P>) -> O>,
}

impl<F, P, O> FnProcessor<F, P, O>
where
    F: Fn(&WorkItem<P>) -> AppResult<O>,
{
    /// Wrap a closure.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, P, O> Clone for FnProcessor<F, P, O> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, P, O> JobProcessor<P, O> for FnProcessor<F, P, O>
where
    F: Fn(&WorkItem<P>) -> AppResult<O> + Send + Sync + Clone + 'static,
    P: Send + Sync + 'static,
    O: Send + 'static,
{
    async fn process(&self, item: &WorkItem<P>) -> AppResult<O> {
        (self.func)(item)
    }
}
