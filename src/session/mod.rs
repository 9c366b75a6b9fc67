//! Session controller.
//!
//! Wires the pieces together for one editing session: drives the sandbox
//! through boot, mount, install and dev-server start, binds frozen selections
//! to the project file that owns them, and runs the patch -> write pipeline
//! when the user edits a class list.
//!
//! # Edit pipeline
//!
//! Edits are serialized per file. Each submission bumps a per-file counter;
//! when an edit gets the file lock and a newer submission exists for the same
//! file, it steps aside (`EditOutcome::Superseded`). The surviving edit
//! always patches the latest committed text using the latest rebased
//! selection, so the last submission wins.
//!
//! A class change targets the element selected when it was submitted.
//! Selecting another element while it is queued or writing does not move
//! the edit, and the edit's rebase never replaces the newer selection.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::descriptor::{EditRequest, ElementDescriptor, Mutation};
use crate::file_tree::{FileTree, FileTreeError};
use crate::patcher::{self, PatchError};
use crate::sandbox::process::UNKNOWN_EXIT_CODE;
use crate::sandbox::{DevServer, SandboxError, SandboxSession};

/// File extensions searched when binding a selection.
const SOURCE_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js"];

/// Process whose output an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// Dependency install.
    Install,
    /// Development server.
    DevServer,
}

/// Coarse session status for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not started.
    Idle,
    /// Sandbox booting.
    Booting,
    /// Project mounted.
    Mounted,
    /// Install running.
    Installing,
    /// Install exited non-zero or timed out; `retry_install` is available.
    InstallFailed {
        /// Install exit code, `-1` after a timeout.
        exit_code: i32,
    },
    /// Dev server spawned.
    Starting,
    /// Preview available.
    Serving {
        /// URL announced by the dev server.
        url: String,
    },
    /// Unrecoverable failure.
    Failed {
        /// Error description.
        message: String,
    },
}

/// Events for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Status changed.
    Status(SessionStatus),
    /// Process output chunk.
    Output {
        /// Producing process.
        process: ProcessKind,
        /// Output text.
        chunk: String,
    },
    /// Install exited non-zero or timed out.
    InstallFailed {
        /// Install exit code, `-1` after a timeout.
        exit_code: i32,
    },
    /// Dev server ready; load `url` in the preview.
    ServerReady {
        /// Listening port.
        port: u16,
        /// Preview URL.
        url: String,
    },
    /// A patched file was pushed into the sandbox.
    FileWritten {
        /// Project-relative path.
        path: String,
    },
    /// An edit could not be applied; the file is unchanged.
    EditRejected {
        /// Project-relative path.
        path: String,
        /// Error description.
        reason: String,
    },
}

/// Errors surfaced by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Sandbox failure.
    Sandbox(SandboxError),
    /// Patch failure for `path`; the file is unchanged.
    Patch {
        /// Project-relative path.
        path: String,
        /// Underlying error.
        source: PatchError,
    },
    /// Install exited non-zero.
    InstallFailed {
        /// Install exit code.
        exit_code: i32,
    },
    /// No project file contains the selected element.
    Unbound {
        /// Display form of the selection.
        target: String,
    },
    /// An edit was requested with nothing selected.
    NoSelection,
    /// The file is not part of the project tree.
    FileNotFound(String),
    /// The in-memory project tree rejected an update.
    Tree(FileTreeError),
}

impl SessionError {
    /// Whether the session can no longer continue.
    ///
    /// A failed file write is recoverable: the edit is dropped, the tree
    /// keeps its previous text and the next edit may succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Sandbox(
                SandboxError::Boot(_)
                    | SandboxError::Spawn { .. }
                    | SandboxError::Timeout {
                        operation: "boot",
                        ..
                    }
            )
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandbox(e) => write!(f, "{e}"),
            Self::Patch { path, source } => write!(f, "{path}: {source}"),
            Self::InstallFailed { exit_code } => {
                write!(f, "Dependency install failed with exit code {exit_code}")
            }
            Self::Unbound { target } => write!(f, "No project file contains {target}"),
            Self::NoSelection => write!(f, "No element selected"),
            Self::FileNotFound(path) => write!(f, "File not found: {path}"),
            Self::Tree(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sandbox(e) => Some(e),
            Self::Patch { source, .. } => Some(source),
            Self::Tree(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SandboxError> for SessionError {
    fn from(e: SandboxError) -> Self {
        Self::Sandbox(e)
    }
}

/// A frozen selection bound to the file that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Bumped by every successful `select`; kept across rebases.
    pub id: u64,
    /// Project-relative path of the owning file.
    pub path: String,
    /// Baseline descriptor for the next edit.
    pub descriptor: ElementDescriptor,
    /// 1-based line of the element.
    pub line: usize,
    /// 1-based column of the element.
    pub column: usize,
}

/// Result of an edit submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit was patched and written.
    Applied {
        /// Project-relative path.
        path: String,
        /// Whether the text changed.
        changed: bool,
    },
    /// A later submission for the same file replaced this one.
    Superseded,
}

/// Selection state shared by `select` and the edit pipeline.
#[derive(Default)]
struct Selections {
    current: Option<Selection>,
    last_id: u64,
    /// Rebased descriptor per selection id with edits still in flight.
    baselines: HashMap<u64, Baseline>,
}

struct Baseline {
    descriptor: ElementDescriptor,
    pending: usize,
}

/// What an edit patches.
enum EditTarget {
    /// The baseline of a selection, rebased after each applied edit.
    Selection(u64),
    /// A fixed descriptor.
    Descriptor(ElementDescriptor),
}

#[derive(Default)]
struct EditQueues {
    locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    submitted: HashMap<String, u64>,
}

/// Drives one editing session.
pub struct SessionController {
    sandbox: Arc<SandboxSession>,
    entry_file: String,
    tree: Mutex<FileTree>,
    selections: Mutex<Selections>,
    queues: Mutex<EditQueues>,
    status: Arc<watch::Sender<SessionStatus>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    ready_registered: AtomicBool,
    dev_server: tokio::sync::Mutex<Option<DevServer>>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("sandbox", &self.sandbox)
            .field("entry_file", &self.entry_file)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// New controller plus the event stream for the rendering layer.
    pub fn new(
        sandbox: Arc<SandboxSession>,
        tree: FileTree,
        entry_file: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus::Idle);
        let controller = Self {
            sandbox,
            entry_file: entry_file.into(),
            tree: Mutex::new(tree),
            selections: Mutex::new(Selections::default()),
            queues: Mutex::new(EditQueues::default()),
            status: Arc::new(status),
            events,
            ready_registered: AtomicBool::new(false),
            dev_server: tokio::sync::Mutex::new(None),
        };
        (controller, rx)
    }

    /// The sandbox this session drives.
    #[must_use]
    pub fn sandbox(&self) -> &Arc<SandboxSession> {
        &self.sandbox
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Current committed text of a project file.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<String> {
        lock(&self.tree).read_text(path).map(str::to_string)
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        lock(&self.selections).current.clone()
    }

    fn set_status(&self, status: SessionStatus) {
        set_status(&self.status, &self.events, status);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn sandbox_error(&self, e: SandboxError) -> SessionError {
        let error = SessionError::Sandbox(e);
        if error.is_fatal() {
            log::error!("[session] {error}");
            self.set_status(SessionStatus::Failed {
                message: error.to_string(),
            });
        } else {
            log::warn!("[session] {error}");
        }
        error
    }

    /// Boot, mount, install, then start the dev server.
    ///
    /// The dev server is only started after install exits with 0. A non-zero
    /// install leaves the session in `InstallFailed`; see [`Self::retry_install`].
    pub async fn start(&self) -> Result<(), SessionError> {
        self.set_status(SessionStatus::Booting);
        self.sandbox.boot().await.map_err(|e| self.sandbox_error(e))?;

        let snapshot = lock(&self.tree).clone();
        self.sandbox
            .mount(&snapshot)
            .await
            .map_err(|e| self.sandbox_error(e))?;
        self.set_status(SessionStatus::Mounted);

        self.install_and_start().await
    }

    /// Re-run install after a failure, starting the dev server on success.
    pub async fn retry_install(&self) -> Result<(), SessionError> {
        log::info!("[session] retrying install");
        self.install_and_start().await
    }

    async fn install_and_start(&self) -> Result<(), SessionError> {
        self.set_status(SessionStatus::Installing);
        let events = self.events.clone();
        let installed = self
            .sandbox
            .install_dependencies(move |chunk| {
                let _ = events.send(SessionEvent::Output {
                    process: ProcessKind::Install,
                    chunk: chunk.to_string(),
                });
            })
            .await;
        let exit_code = match installed {
            Ok(exit_code) => exit_code,
            Err(e @ SandboxError::Timeout { .. }) => {
                let error = self.sandbox_error(e);
                self.set_status(SessionStatus::InstallFailed {
                    exit_code: UNKNOWN_EXIT_CODE,
                });
                self.emit(SessionEvent::InstallFailed {
                    exit_code: UNKNOWN_EXIT_CODE,
                });
                return Err(error);
            }
            Err(e) => return Err(self.sandbox_error(e)),
        };

        if exit_code != 0 {
            log::warn!("[session] install failed with exit code {exit_code}");
            self.set_status(SessionStatus::InstallFailed { exit_code });
            self.emit(SessionEvent::InstallFailed { exit_code });
            return Err(SessionError::InstallFailed { exit_code });
        }

        self.register_ready_listener();
        self.set_status(SessionStatus::Starting);
        let events = self.events.clone();
        let dev_server = self
            .sandbox
            .start_dev_server(move |chunk| {
                let _ = events.send(SessionEvent::Output {
                    process: ProcessKind::DevServer,
                    chunk: chunk.to_string(),
                });
            })
            .await
            .map_err(|e| self.sandbox_error(e))?;
        *self.dev_server.lock().await = Some(dev_server);
        Ok(())
    }

    fn register_ready_listener(&self) {
        if self.ready_registered.swap(true, Ordering::SeqCst) {
            return;
        }
        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        self.sandbox.on_server_ready(move |ready| {
            log::info!("[session] preview at {}", ready.url);
            set_status(
                &status,
                &events,
                SessionStatus::Serving {
                    url: ready.url.clone(),
                },
            );
            let _ = events.send(SessionEvent::ServerReady {
                port: ready.port,
                url: ready.url.clone(),
            });
        });
    }

    /// Candidate files for a selection: entry file first, then the other
    /// script files in path order.
    fn candidate_files(&self) -> Vec<(String, String)> {
        let tree = lock(&self.tree);
        let mut others: Vec<(String, String)> = tree
            .files()
            .into_iter()
            .filter(|(path, _)| path != &self.entry_file && is_source_file(path))
            .filter_map(|(path, contents)| contents.as_text().map(|text| (path, text.to_string())))
            .collect();
        others.sort_by(|a, b| a.0.cmp(&b.0));

        let mut candidates = Vec::with_capacity(others.len() + 1);
        if let Some(entry) = tree.read_text(&self.entry_file) {
            candidates.push((self.entry_file.clone(), entry.to_string()));
        }
        candidates.extend(others);
        candidates
    }

    /// Bind a frozen descriptor to the first file that contains it.
    pub fn select(&self, descriptor: ElementDescriptor) -> Result<Selection, SessionError> {
        for (path, source) in self.candidate_files() {
            match patcher::locate(&source, &descriptor) {
                Ok(located) => {
                    let mut selections = lock(&self.selections);
                    selections.last_id += 1;
                    let selection = Selection {
                        id: selections.last_id,
                        path,
                        descriptor,
                        line: located.line,
                        column: located.column,
                    };
                    log::info!(
                        "[session] selected {} at {}:{}:{}",
                        selection.descriptor,
                        selection.path,
                        selection.line,
                        selection.column
                    );
                    selections.current = Some(selection.clone());
                    return Ok(selection);
                }
                Err(PatchError::NoMatch { .. }) => {}
                Err(PatchError::Parse(e)) => log::debug!("[session] skipping {path}: {e}"),
            }
        }
        lock(&self.selections).current = None;
        Err(SessionError::Unbound {
            target: descriptor.to_string(),
        })
    }

    /// Replace the selected element's classes.
    ///
    /// The target is the element selected at the time of the call.
    pub async fn apply_class_change(&self, classes: &str) -> Result<EditOutcome, SessionError> {
        let (id, path) = {
            let mut selections = lock(&self.selections);
            let current = selections.current.clone().ok_or(SessionError::NoSelection)?;
            selections
                .baselines
                .entry(current.id)
                .or_insert_with(|| Baseline {
                    descriptor: current.descriptor.clone(),
                    pending: 0,
                })
                .pending += 1;
            (current.id, current.path)
        };
        let result = self
            .run_edit(&path, &EditTarget::Selection(id), Mutation::set_classes(classes))
            .await;
        self.release_baseline(id);
        result
    }

    /// Apply an explicit edit request to `path`.
    pub async fn apply_edit(&self, path: &str, request: EditRequest) -> Result<EditOutcome, SessionError> {
        self.run_edit(path, &EditTarget::Descriptor(request.target), request.mutation)
            .await
    }

    fn release_baseline(&self, id: u64) {
        let mut selections = lock(&self.selections);
        if let Some(baseline) = selections.baselines.get_mut(&id) {
            baseline.pending = baseline.pending.saturating_sub(1);
            if baseline.pending == 0 {
                selections.baselines.remove(&id);
            }
        }
    }

    fn file_lock(&self, path: &str) -> (Arc<tokio::sync::Mutex<()>>, u64) {
        let mut queues = lock(&self.queues);
        let submitted = queues.submitted.entry(path.to_string()).or_insert(0);
        *submitted += 1;
        let ticket = *submitted;
        let file_lock = Arc::clone(queues.locks.entry(path.to_string()).or_default());
        (file_lock, ticket)
    }

    fn is_latest(&self, path: &str, ticket: u64) -> bool {
        lock(&self.queues).submitted.get(path) == Some(&ticket)
    }

    async fn run_edit(
        &self,
        path: &str,
        target: &EditTarget,
        mutation: Mutation,
    ) -> Result<EditOutcome, SessionError> {
        let (file_lock, ticket) = self.file_lock(path);
        let _guard = file_lock.lock().await;
        if !self.is_latest(path, ticket) {
            log::debug!("[session] edit to {path} superseded");
            return Ok(EditOutcome::Superseded);
        }

        let descriptor = match target {
            EditTarget::Selection(id) => lock(&self.selections)
                .baselines
                .get(id)
                .map(|baseline| baseline.descriptor.clone())
                .ok_or(SessionError::NoSelection)?,
            EditTarget::Descriptor(descriptor) => descriptor.clone(),
        };
        let request = EditRequest::new(descriptor, mutation);
        let source = self
            .file(path)
            .ok_or_else(|| SessionError::FileNotFound(path.to_string()))?;

        let updated = match patcher::update_code(&source, &request) {
            Ok(updated) => updated,
            Err(e) => {
                self.emit(SessionEvent::EditRejected {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
                return Err(SessionError::Patch {
                    path: path.to_string(),
                    source: e,
                });
            }
        };

        let changed = updated != source;
        if changed {
            self.sandbox
                .write_file(path, &updated)
                .await
                .map_err(|e| self.sandbox_error(e))?;
            lock(&self.tree)
                .write_text(path, &updated)
                .map_err(SessionError::Tree)?;
            self.emit(SessionEvent::FileWritten {
                path: path.to_string(),
            });
        }

        self.rebase_selection(path, target, &request, &updated);
        Ok(EditOutcome::Applied {
            path: path.to_string(),
            changed,
        })
    }

    /// Move baselines past an applied edit.
    ///
    /// The current selection is only replaced while it still names the
    /// element the edit targeted.
    fn rebase_selection(&self, path: &str, target: &EditTarget, request: &EditRequest, updated: &str) {
        let rebased = request.rebased();
        let located = patcher::locate(updated, &rebased).ok();
        let mut selections = lock(&self.selections);
        if let EditTarget::Selection(id) = target {
            if let Some(baseline) = selections.baselines.get_mut(id) {
                baseline.descriptor = rebased.clone();
            }
        }

        let Some(current) = selections.current.as_mut() else {
            return;
        };
        let follows = match target {
            EditTarget::Selection(id) => current.id == *id,
            EditTarget::Descriptor(descriptor) => {
                current.path == path
                    && current
                        .descriptor
                        .matches(&descriptor.tag_name, &descriptor.class_list)
            }
        };
        if !follows {
            return;
        }
        current.descriptor = rebased;
        if let Some(located) = located {
            current.line = located.line;
            current.column = located.column;
        }
    }

    /// Stop the dev server.
    pub async fn shutdown(&self) {
        if let Some(dev_server) = self.dev_server.lock().await.take() {
            dev_server.kill();
        }
        self.sandbox.shutdown().await;
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("[session] recovering poisoned lock");
        PoisonError::into_inner(poisoned)
    })
}

fn set_status(
    status: &watch::Sender<SessionStatus>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    next: SessionStatus,
) {
    let changed = status.send_if_modified(|current| {
        if *current == next || matches!(current, SessionStatus::Failed { .. }) {
            return false;
        }
        *current = next.clone();
        true
    });
    if changed {
        let _ = events.send(SessionEvent::Status(next));
    }
}

fn is_source_file(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
