//! Owned handles for simulated-latency tasks.
//!
//! Every delayed mutation in the session runs inside a [`ScopedTask`]. The
//! owner of the handle owns the mutation: dropping or cancelling the handle
//! aborts the task, so a discarded wizard or route view can never apply a
//! credit after it is gone.

use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct ScopedTask {
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    /// Runs `fut` after `delay` on the current runtime.
    pub fn spawn_after<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Aborts the task if it has not completed yet.
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Releases the handle without aborting. Used by a task that clears its
    /// own slot while it is completing.
    pub fn disarm(mut self) {
        self.handle.take();
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
