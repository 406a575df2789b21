//! Cooperative run-loop for async and streaming callables.
//!
//! The dispatcher owns one `RunLoop`: a single-threaded tokio runtime created
//! on first use, reused for every later async or streaming invocation, and
//! released by an explicit `shutdown()`. A closed run-loop is never recreated.
//!
//! `block_on` must not be called from inside another tokio runtime; the
//! surrounding pipeline drives dispatch from plain threads. At most one
//! thread should drive the loop at a time.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

/// Errors from the run-loop itself (not from the futures it drives).
#[derive(Debug, thiserror::Error)]
pub enum RunLoopError {
    #[error("run-loop has been shut down")]
    Closed,
    #[error("failed to start run-loop: {0}")]
    Start(#[from] std::io::Error),
}

enum State {
    Idle,
    Running(Arc<Runtime>),
    Closed,
}

/// Lazily started, explicitly stopped single-threaded executor.
pub struct RunLoop {
    state: Mutex<State>,
}

impl RunLoop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
        }
    }

    /// Returns the runtime, starting it on first use.
    fn runtime(&self) -> Result<Arc<Runtime>, RunLoopError> {
        let mut state = self.state.lock();
        match &*state {
            State::Running(runtime) => Ok(Arc::clone(runtime)),
            State::Closed => Err(RunLoopError::Closed),
            State::Idle => {
                let runtime = Arc::new(Builder::new_current_thread().enable_all().build()?);
                tracing::debug!("run-loop started");
                *state = State::Running(Arc::clone(&runtime));
                Ok(runtime)
            }
        }
    }

    /// Drive `future` to completion, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `RunLoopError::Closed` after `shutdown()`, or
    /// `RunLoopError::Start` if the runtime could not be created.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, RunLoopError> {
        let runtime = self.runtime()?;
        Ok(runtime.block_on(future))
    }

    /// Run `f` with the run-loop as the ambient runtime (so it may spawn or
    /// create timers) without blocking on anything.
    ///
    /// # Errors
    ///
    /// Same as `block_on`.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> Result<R, RunLoopError> {
        let runtime = self.runtime()?;
        let _guard = runtime.enter();
        Ok(f())
    }

    /// Whether the runtime has been created and not yet shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), State::Running(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), State::Closed)
    }

    /// Release the runtime. Later `block_on`/`enter` calls fail with
    /// `RunLoopError::Closed`. Idempotent.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Closed);
        if let State::Running(runtime) = previous {
            // An in-flight streaming pull may still hold a reference; it then
            // drops the runtime when it finishes.
            if let Ok(runtime) = Arc::try_unwrap(runtime) {
                runtime.shutdown_background();
            }
            tracing::debug!("run-loop shut down");
        }
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.state.lock() {
            State::Idle => "idle",
            State::Running(_) => "running",
            State::Closed => "closed",
        };
        f.debug_struct("RunLoop").field("state", &state).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_lazily() {
        let runloop = RunLoop::new();
        assert!(!runloop.is_running());
        assert_eq!(runloop.block_on(async { 2 + 2 }).unwrap(), 4);
        assert!(runloop.is_running());
    }

    #[test]
    fn reuses_the_same_runtime() {
        let runloop = RunLoop::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u8>();
        // A task spawned during one call only completes if a later call
        // drives the same runtime.
        let task = runloop
            .block_on(async { tokio::spawn(async move { rx.await.unwrap_or(0) }) })
            .unwrap();
        tx.send(7).unwrap();
        assert_eq!(runloop.block_on(task).unwrap().unwrap(), 7);
    }

    #[test]
    fn drives_timers() {
        let runloop = RunLoop::new();
        let value = runloop
            .block_on(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                "done"
            })
            .unwrap();
        assert_eq!(value, "done");
    }

    #[test]
    fn closed_after_shutdown_and_never_recreated() {
        let runloop = RunLoop::new();
        runloop.block_on(async {}).unwrap();
        runloop.shutdown();
        assert!(runloop.is_closed());
        assert!(matches!(
            runloop.block_on(async {}),
            Err(RunLoopError::Closed)
        ));
        assert!(matches!(runloop.enter(|| ()), Err(RunLoopError::Closed)));
        assert!(runloop.is_closed());
    }

    #[test]
    fn shutdown_before_start_closes() {
        let runloop = RunLoop::new();
        runloop.shutdown();
        runloop.shutdown();
        assert!(runloop.is_closed());
    }

    #[test]
    fn enter_provides_runtime_context() {
        let runloop = RunLoop::new();
        let has_handle = runloop
            .enter(|| tokio::runtime::Handle::try_current().is_ok())
            .unwrap();
        assert!(has_handle);
    }
}
