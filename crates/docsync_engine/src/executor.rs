//! Bounded operation pools.
//!
//! A pass runs two independent pools, one for document work and one for
//! attachment work. Each pool admits at most `limit` operations at a time in
//! FIFO order, and batch results come back in submission order regardless of
//! completion order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;

use crate::error::{ReplicateError, ReplicateResult};

/// A named pool of operation slots.
#[derive(Debug, Clone)]
pub struct OperationPool {
    name: &'static str,
    limit: usize,
    permits: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
}

impl OperationPool {
    /// A pool of `limit` slots (at least one) observing `cancelled`.
    pub fn new(name: &'static str, limit: usize, cancelled: Arc<AtomicBool>) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            cancelled,
        }
    }

    /// Pool name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum operations in flight.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run one operation once a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicateError::Cancelled`] if the pass was cancelled before
    /// the operation was admitted, otherwise whatever the operation returns.
    pub async fn run<T, F>(&self, operation: F) -> ReplicateResult<T>
    where
        F: Future<Output = ReplicateResult<T>>,
    {
        self.check_cancelled()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ReplicateError::Cancelled)?;
        self.check_cancelled()?;
        operation.await
    }

    /// Run `operation` for every item, results in item order.
    ///
    /// Stops at the first error; later items are not started.
    ///
    /// # Errors
    ///
    /// The first error returned by an operation, or cancellation.
    pub async fn run_all<I, T, F, Fut>(&self, items: I, mut operation: F) -> ReplicateResult<Vec<T>>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = ReplicateResult<T>>,
    {
        stream::iter(items)
            .map(|item| self.run(operation(item)))
            .buffered(self.limit)
            .try_collect()
            .await
    }

    /// Refuse every pending and future admission.
    pub fn close(&self) {
        self.permits.close();
    }

    fn check_cancelled(&self) -> ReplicateResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ReplicateError::Cancelled)
        } else {
            Ok(())
        }
    }
}
