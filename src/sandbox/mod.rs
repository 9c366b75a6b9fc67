//! Sandbox lifecycle management.
//!
//! A [`SandboxSession`] owns one sandboxed execution environment for the
//! lifetime of an editing session: boot it once, mount the project, install
//! dependencies, start the dev server, then push edited files into it.
//!
//! # State machine
//!
//! ```text
//! Unbooted -> Booting -> Ready -> Mounting -> Installing -> Starting -> Serving
//!    ^           |                                                        |
//!    +-- boot failure                       dev server exit -> Ready <----+
//!
//! Spawn failure from any state -> Failed (terminal)
//! ```
//!
//! The runtime behind the session is a trait object ([`SandboxRuntime`]) so
//! tests can substitute a recording fake for [`local::LocalRuntime`].

pub mod local;
pub mod process;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, OnceCell};
use uuid::Uuid;

use crate::constants;
use crate::file_tree::FileTree;
pub use process::{ProcessControl, ProcessExit, ProcessHandle};

/// Lifecycle state of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// No runtime instance yet (or the last boot failed).
    Unbooted,
    /// Boot in flight.
    Booting,
    /// Booted, nothing mounted or running.
    Ready,
    /// Project files are being written.
    Mounting,
    /// Dependency install running.
    Installing,
    /// Dev server spawned, not yet announced.
    Starting,
    /// Dev server announced its URL.
    Serving,
    /// A process could not be spawned. Terminal.
    Failed,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbooted => "unbooted",
            Self::Booting => "booting",
            Self::Ready => "ready",
            Self::Mounting => "mounting",
            Self::Installing => "installing",
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Dev server readiness announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReady {
    /// Port the dev server listens on.
    pub port: u16,
    /// URL the preview should load.
    pub url: String,
}

/// Process limits and commands for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Upper bound for booting the runtime.
    pub boot_timeout: Duration,
    /// Upper bound for the install process.
    pub install_timeout: Duration,
    /// Install program.
    pub install_program: String,
    /// Install arguments.
    pub install_args: Vec<String>,
    /// Dev server program.
    pub dev_program: String,
    /// Dev server arguments.
    pub dev_args: Vec<String>,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        let words = |command: &str| -> (String, Vec<String>) {
            let mut parts = command.split_whitespace().map(str::to_string);
            let program = parts.next().unwrap_or_default();
            (program, parts.collect())
        };
        let (install_program, install_args) = words(constants::DEFAULT_INSTALL_COMMAND);
        let (dev_program, dev_args) = words(constants::DEFAULT_DEV_COMMAND);
        Self {
            boot_timeout: constants::DEFAULT_BOOT_TIMEOUT,
            install_timeout: constants::DEFAULT_INSTALL_TIMEOUT,
            install_program,
            install_args,
            dev_program,
            dev_args,
        }
    }
}

/// Errors from the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// The runtime failed to initialize. A later `boot()` may retry.
    Boot(String),
    /// The runtime refused to spawn a process.
    Spawn {
        /// Program that failed.
        command: String,
        /// Reason reported by the runtime.
        reason: String,
    },
    /// A direct file write failed.
    WriteFailed {
        /// Project-relative path.
        path: String,
        /// Reason reported by the runtime.
        reason: String,
    },
    /// Mounting the project tree failed.
    Mount(String),
    /// The operation needs a booted runtime.
    NotBooted,
    /// A dev server is already running in this session.
    AlreadyRunning,
    /// An operation exceeded its limit.
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// Limit that was exceeded.
        after: Duration,
    },
    /// Other I/O failure inside the runtime.
    Io(String),
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot(reason) => write!(f, "Sandbox boot failed: {reason}"),
            Self::Spawn { command, reason } => write!(f, "Failed to spawn '{command}': {reason}"),
            Self::WriteFailed { path, reason } => write!(f, "Failed to write {path}: {reason}"),
            Self::Mount(reason) => write!(f, "Failed to mount project: {reason}"),
            Self::NotBooted => write!(f, "Sandbox is not booted"),
            Self::AlreadyRunning => write!(f, "Dev server is already running"),
            Self::Timeout { operation, after } => {
                write!(f, "{operation} timed out after {}s", after.as_secs())
            }
            Self::Io(reason) => write!(f, "Sandbox I/O error: {reason}"),
        }
    }
}

impl std::error::Error for SandboxError {}

/// Factory for runtime instances.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Create one runtime instance.
    async fn boot(&self) -> Result<Arc<dyn Container>, SandboxError>;
}

/// A booted runtime instance.
#[async_trait]
pub trait Container: Send + Sync {
    /// Write `tree` into the instance's filesystem.
    async fn mount(&self, tree: &FileTree) -> Result<(), SandboxError>;

    /// Spawn `program` with `args` in the project directory.
    async fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle, SandboxError>;

    /// Write one file. The parent directory must already exist.
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError>;

    /// Readiness announcements from servers started in this instance.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;
}

type ReadyCallback = Arc<dyn Fn(&ServerReady) + Send + Sync>;

/// Readiness fan-out with replay of the current announcement.
#[derive(Default)]
struct ReadyListeners {
    current: Option<ServerReady>,
    callbacks: Vec<ReadyCallback>,
}

impl ReadyListeners {
    /// Record an announcement. Returns the callbacks to notify when it is a
    /// new transition.
    fn announce(&mut self, event: &ServerReady) -> Option<Vec<ReadyCallback>> {
        if self.current.as_ref() == Some(event) {
            return None;
        }
        self.current = Some(event.clone());
        Some(self.callbacks.clone())
    }
}

/// Control handle for a running dev server.
#[derive(Debug, Clone)]
pub struct DevServer {
    exit: ProcessExit,
}

impl DevServer {
    /// Wait for the dev server to exit.
    pub async fn wait(&self) -> i32 {
        self.exit.wait().await
    }

    /// Exit code if it has exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.code()
    }

    /// Request termination.
    pub fn kill(&self) {
        self.exit.kill();
    }
}

/// One sandbox per editing session.
pub struct SandboxSession {
    id: Uuid,
    runtime: Arc<dyn SandboxRuntime>,
    limits: SandboxLimits,
    container: OnceCell<Arc<dyn Container>>,
    state: Arc<watch::Sender<SandboxState>>,
    ready: Arc<Mutex<ReadyListeners>>,
    dev_server: tokio::sync::Mutex<Option<ProcessExit>>,
}

impl fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl SandboxSession {
    /// New unbooted session.
    pub fn new(runtime: Arc<dyn SandboxRuntime>, limits: SandboxLimits) -> Self {
        let (state, _) = watch::channel(SandboxState::Unbooted);
        Self {
            id: Uuid::new_v4(),
            runtime,
            limits,
            container: OnceCell::new(),
            state: Arc::new(state),
            ready: Arc::new(Mutex::new(ReadyListeners::default())),
            dev_server: tokio::sync::Mutex::new(None),
        }
    }

    /// Session identifier, used in log lines.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SandboxState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SandboxState> {
        self.state.subscribe()
    }

    /// Configured limits.
    #[must_use]
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    fn set_state(&self, next: SandboxState) {
        let id = self.id;
        self.state.send_if_modified(|current| {
            if *current == next || *current == SandboxState::Failed {
                return false;
            }
            log::debug!("[sandbox {id}] {current} -> {next}");
            *current = next;
            true
        });
    }

    fn fail(&self) {
        self.set_state(SandboxState::Failed);
    }

    fn booted(&self) -> Result<Arc<dyn Container>, SandboxError> {
        self.container.get().cloned().ok_or(SandboxError::NotBooted)
    }

    /// Boot the runtime. Idempotent.
    ///
    /// Concurrent callers wait on the attempt in flight. A failed attempt
    /// leaves the session `Unbooted` so a later call starts over.
    pub async fn boot(&self) -> Result<(), SandboxError> {
        self.container
            .get_or_try_init(|| async {
                log::info!("[sandbox {}] booting", self.id);
                self.set_state(SandboxState::Booting);
                let result = tokio::time::timeout(self.limits.boot_timeout, self.runtime.boot()).await;
                let container = match result {
                    Ok(Ok(container)) => container,
                    Ok(Err(e)) => {
                        log::error!("[sandbox {}] {e}", self.id);
                        self.set_state(SandboxState::Unbooted);
                        return Err(e);
                    }
                    Err(_) => {
                        log::error!("[sandbox {}] boot timed out", self.id);
                        self.set_state(SandboxState::Unbooted);
                        return Err(SandboxError::Timeout {
                            operation: "boot",
                            after: self.limits.boot_timeout,
                        });
                    }
                };
                self.watch_readiness(container.server_ready());
                self.set_state(SandboxState::Ready);
                Ok(container)
            })
            .await
            .map(|_| ())
    }

    fn watch_readiness(&self, mut events: broadcast::Receiver<ServerReady>) {
        let ready = Arc::clone(&self.ready);
        let state = Arc::clone(&self.state);
        let id = self.id;
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[sandbox {id}] missed {skipped} readiness events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let callbacks = match ready.lock() {
                    Ok(mut listeners) => listeners.announce(&event),
                    Err(_) => break,
                };
                let Some(callbacks) = callbacks else {
                    continue;
                };
                log::info!("[sandbox {id}] server ready at {}", event.url);
                state.send_if_modified(|current| {
                    if *current == SandboxState::Failed {
                        return false;
                    }
                    *current = SandboxState::Serving;
                    true
                });
                for callback in callbacks {
                    callback(&event);
                }
            }
        });
    }

    /// Register a readiness listener.
    ///
    /// The listener runs once per readiness transition. If the server is
    /// already serving, it runs immediately with the current announcement.
    pub fn on_server_ready<F>(&self, callback: F)
    where
        F: Fn(&ServerReady) + Send + Sync + 'static,
    {
        let callback: ReadyCallback = Arc::new(callback);
        let replay = match self.ready.lock() {
            Ok(mut listeners) => {
                listeners.callbacks.push(Arc::clone(&callback));
                listeners.current.clone()
            }
            Err(_) => None,
        };
        if let Some(event) = replay {
            callback(&event);
        }
    }

    /// Current readiness announcement, if serving.
    #[must_use]
    pub fn server_ready(&self) -> Option<ServerReady> {
        self.ready.lock().ok().and_then(|listeners| listeners.current.clone())
    }

    /// Write `tree` into the sandbox. May be called repeatedly.
    pub async fn mount(&self, tree: &FileTree) -> Result<(), SandboxError> {
        let container = self.booted()?;
        if self.state() == SandboxState::Ready {
            self.set_state(SandboxState::Mounting);
        }
        container.mount(tree).await?;
        log::info!("[sandbox {}] mounted {} files", self.id, tree.files().len());
        Ok(())
    }

    /// Run the install command to completion.
    ///
    /// Returns the exit code once all output has been passed to `on_output`.
    /// A non-zero exit is a normal return value.
    pub async fn install_dependencies<F>(&self, on_output: F) -> Result<i32, SandboxError>
    where
        F: FnMut(&str) + Send,
    {
        let container = self.booted()?;
        self.set_state(SandboxState::Installing);
        let process = container
            .spawn(&self.limits.install_program, &self.limits.install_args)
            .await
            .inspect_err(|_| self.fail())?;
        let exit = process.exit.clone();

        match tokio::time::timeout(self.limits.install_timeout, process.drain(on_output)).await {
            Ok(code) => {
                log::info!("[sandbox {}] install exited with {code}", self.id);
                Ok(code)
            }
            Err(_) => {
                exit.kill();
                log::error!("[sandbox {}] install timed out", self.id);
                Err(SandboxError::Timeout {
                    operation: "install",
                    after: self.limits.install_timeout,
                })
            }
        }
    }

    /// Spawn the dev server and return immediately.
    ///
    /// Output goes to `on_output` from a background task. Readiness arrives
    /// through [`Self::on_server_ready`].
    pub async fn start_dev_server<F>(&self, mut on_output: F) -> Result<DevServer, SandboxError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let container = self.booted()?;
        let mut slot = self.dev_server.lock().await;
        if slot.as_ref().is_some_and(ProcessExit::is_running) {
            return Err(SandboxError::AlreadyRunning);
        }

        self.set_state(SandboxState::Starting);
        let ProcessHandle { mut output, exit } = container
            .spawn(&self.limits.dev_program, &self.limits.dev_args)
            .await
            .inspect_err(|_| self.fail())?;
        *slot = Some(exit.clone());

        let ready = Arc::clone(&self.ready);
        let state = Arc::clone(&self.state);
        let id = self.id;
        let watcher = exit.clone();
        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                on_output(&chunk);
            }
            let code = watcher.wait().await;
            log::info!("[sandbox {id}] dev server exited with {code}");
            if let Ok(mut listeners) = ready.lock() {
                listeners.current = None;
            }
            state.send_if_modified(|current| {
                if matches!(*current, SandboxState::Starting | SandboxState::Serving) {
                    *current = SandboxState::Ready;
                    true
                } else {
                    false
                }
            });
        });

        Ok(DevServer { exit })
    }

    /// Write one file into the running sandbox.
    pub async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        let container = self.booted()?;
        container.write_file(path, contents).await?;
        log::debug!("[sandbox {}] wrote {path}", self.id);
        Ok(())
    }

    /// Kill the dev server, if any.
    pub async fn shutdown(&self) {
        if let Some(exit) = self.dev_server.lock().await.take() {
            log::info!("[sandbox {}] stopping dev server", self.id);
            exit.kill();
            exit.wait().await;
        }
    }
}
