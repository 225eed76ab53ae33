//! # Channel Worker
//!
//! One background task with a cancellation token. Stopping cancels the token,
//! waits a bounded time for the task to return and aborts it otherwise.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Handle to a running background task
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `task` with a fresh cancellation token
    ///
    /// # Arguments
    ///
    /// * `name` - Used in log messages
    /// * `task` - Builds the task future from the token it must observe
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use drone_link::channel::worker::Worker;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let worker = Worker::spawn("ticker", |cancel| async move {
    ///     cancel.cancelled().await;
    /// });
    /// assert!(worker.stop(Duration::from_millis(100)).await);
    /// # }
    /// ```
    pub fn spawn<F, Fut>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task(cancel.clone()));
        debug!("Worker {} started", name);
        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task has returned (on its own or after cancellation)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if the task exited cleanly within `join_timeout`,
    ///   `false` if it panicked or had to be aborted
    pub async fn stop(self, join_timeout: Duration) -> bool {
        let Worker { name, cancel, mut handle } = self;
        cancel.cancel();

        match tokio::time::timeout(join_timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!("Worker {} stopped", name);
                true
            }
            Ok(Err(e)) => {
                error!("Worker {} ended abnormally: {}", name, e);
                false
            }
            Err(_) => {
                error!(
                    "Worker {} did not exit within {} ms, terminating it",
                    name,
                    join_timeout.as_millis()
                );
                handle.abort();
                false
            }
        }
    }
}
