// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared pool for slow lifecycle work.
//!
//! Tasks are tokio tasks gated by a semaphore: at most `size` of them run
//! their body at once, the rest wait for a permit in FIFO order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Bounded worker pool.
#[derive(Debug, Clone)]
pub struct SharedPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl SharedPool {
    /// Create a pool running at most `size` tasks at once.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of concurrently running tasks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks that could start right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Whether the pool has been shut down.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Run a fire-and-forget task.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Dropping the handle detaches the task.
        self.submit(async move {
            task.await;
            Ok(())
        })
        .map(drop)
    }

    /// Run a task and get a handle resolving to its result.
    ///
    /// Fails with [`Error::PoolClosed`] once the pool is shut down. A task
    /// still waiting for a permit when the pool closes resolves to the same
    /// error without running.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with_fallback(task, async { Err(Error::PoolClosed) })
    }

    /// Run a task, or `fallback` if the pool closes before the task gets a
    /// permit.
    ///
    /// Exactly one of the two futures runs once this returns `Ok`, so
    /// cleanup placed in `fallback` happens even if the handle is dropped.
    pub fn submit_with_fallback<F, C, T>(&self, task: F, fallback: C) -> Result<TaskHandle<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        C: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.semaphore.is_closed() {
            return Err(Error::PoolClosed);
        }

        let semaphore = self.semaphore.clone();
        let handle = tokio::spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => {
                    debug!("Shared pool closed before task started");
                    fallback.await
                }
            }
        });
        Ok(TaskHandle { inner: handle })
    }

    /// Stop accepting tasks.
    ///
    /// Waits up to `grace` for running and queued tasks to finish, then
    /// closes the pool. Returns `true` if everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained =
            match tokio::time::timeout(grace, self.semaphore.acquire_many(self.size as u32)).await
            {
                Ok(Ok(permits)) => {
                    permits.forget();
                    true
                }
                Ok(Err(_)) => true,
                Err(_) => {
                    warn!(
                        grace_secs = grace.as_secs(),
                        "Shared pool did not drain within grace period"
                    );
                    false
                }
            };
        self.semaphore.close();
        debug!(drained, "Shared pool closed");
        drained
    }
}

/// Handle to a task submitted to the [`SharedPool`].
///
/// Dropping the handle detaches the task; it keeps running.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::TaskFailed(e.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
