//! Handles for processes spawned inside a sandbox.
//!
//! A runtime creates a [`ProcessHandle`] / [`ProcessControl`] pair per
//! process. The runtime keeps the control half and feeds it output chunks and
//! the final exit code; the caller gets the handle.
//!
//! # Guarantees
//!
//! - Output chunks arrive in order and the stream ends once every sender is
//!   gone (the process has exited and its pumps have flushed).
//! - The exit code resolves exactly once; [`ProcessExit::wait`] can be awaited
//!   any number of times and always yields the same value.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};

/// Exit code reported when a process vanished without one.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Caller side of a spawned process.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Output chunks (stdout and stderr interleaved, lossily decoded).
    pub output: mpsc::UnboundedReceiver<String>,
    /// Exit status and kill switch.
    pub exit: ProcessExit,
}

impl ProcessHandle {
    /// New handle plus the control half for the runtime.
    #[must_use]
    pub fn channel() -> (Self, ProcessControl) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = Arc::new(Notify::new());
        let handle = Self {
            output: output_rx,
            exit: ProcessExit {
                code: exit_rx,
                kill: Arc::clone(&kill),
            },
        };
        let control = ProcessControl {
            output: output_tx,
            exit: Arc::new(exit_tx),
            kill,
        };
        (handle, control)
    }

    /// Wait for the exit code without reading output.
    pub async fn wait(&self) -> i32 {
        self.exit.wait().await
    }

    /// Request termination.
    pub fn kill(&self) {
        self.exit.kill();
    }

    /// Read every remaining output chunk, then the exit code.
    ///
    /// `on_output` sees all output before this returns.
    pub async fn drain<F>(mut self, mut on_output: F) -> i32
    where
        F: FnMut(&str),
    {
        while let Some(chunk) = self.output.recv().await {
            on_output(&chunk);
        }
        self.exit.wait().await
    }
}

/// Exit status of a process plus the ability to kill it. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    code: watch::Receiver<Option<i32>>,
    kill: Arc<Notify>,
}

impl ProcessExit {
    /// Wait for the exit code.
    pub async fn wait(&self) -> i32 {
        let mut code = self.code.clone();
        let exited = code.wait_for(Option::is_some).await.map(|value| *value);
        exited.ok().flatten().unwrap_or(UNKNOWN_EXIT_CODE)
    }

    /// Exit code if the process has exited.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        *self.code.borrow()
    }

    /// Whether the process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.code().is_none() && self.code.has_changed().is_ok()
    }

    /// Request termination. Repeated calls are harmless.
    pub fn kill(&self) {
        self.kill.notify_one();
    }
}

/// Runtime side of a spawned process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    output: mpsc::UnboundedSender<String>,
    exit: Arc<watch::Sender<Option<i32>>>,
    kill: Arc<Notify>,
}

impl ProcessControl {
    /// Forward an output chunk. Returns `false` once the caller stopped listening.
    pub fn emit(&self, chunk: impl Into<String>) -> bool {
        self.output.send(chunk.into()).is_ok()
    }

    /// Record the exit code. Only the first call has an effect.
    pub fn exit(&self, code: i32) {
        self.exit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(code);
            true
        });
    }

    /// Resolves when the caller asks for termination.
    pub async fn killed(&self) {
        self.kill.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_resolves_once() {
        let (handle, control) = ProcessHandle::channel();
        assert!(handle.exit.is_running());
        control.exit(0);
        control.exit(3);
        assert_eq!(handle.wait().await, 0);
        assert_eq!(handle.wait().await, 0);
        assert_eq!(handle.exit.code(), Some(0));
        assert!(!handle.exit.is_running());
    }

    #[tokio::test]
    async fn test_drain_delivers_output_before_exit() {
        let (handle, control) = ProcessHandle::channel();
        let writer = tokio::spawn(async move {
            assert!(control.emit("added 1 package"));
            assert!(control.emit("\n"));
            control.exit(1);
        });
        let mut seen = String::new();
        let code = handle.drain(|chunk| seen.push_str(chunk)).await;
        writer.await.unwrap();
        assert_eq!(code, 1);
        assert_eq!(seen, "added 1 package\n");
    }

    #[tokio::test]
    async fn test_dropped_control_reports_unknown() {
        let (handle, control) = ProcessHandle::channel();
        drop(control);
        assert_eq!(handle.wait().await, UNKNOWN_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_kill_wakes_runtime() {
        let (handle, control) = ProcessHandle::channel();
        handle.kill();
        tokio::time::timeout(std::time::Duration::from_secs(1), control.killed())
            .await
            .unwrap();
    }
}
