//! previewsync - visual-to-source synchronization for live JSX previews.
//!
//! A user points at a rendered element in a live preview; previewsync finds
//! the markup in the project source that produced it, rewrites that element's
//! class attribute with a minimal text edit, and pushes the file into the
//! sandboxed dev server so hot reload picks it up.
//!
//! # Architecture
//!
//! - **Bridge** - Hit-test queries between host and preview, with staleness
//!   rejection by sequence number
//! - **Overlay** - Editing-mode pointer capture, highlight box, click-to-select
//! - **Patcher** - Tolerant JSX/TSX scanner, first-match element lookup and
//!   splice-based regeneration
//! - **Sandbox** - Boot/mount/install/serve lifecycle over a pluggable runtime
//! - **Session** - Sequences the sandbox and runs the per-file edit pipeline
//!
//! # Modules
//!
//! - [`bridge`] - Selection protocol and hit testing
//! - [`overlay`] - Highlight overlay state
//! - [`patcher`] - Element locator and source patcher
//! - [`sandbox`] - Sandbox lifecycle management
//! - [`session`] - Session controller
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod bridge;
pub mod commands;
pub mod overlay;
pub mod patcher;
pub mod sandbox;
pub mod session;

pub mod config;
pub mod constants;
pub mod descriptor;
pub mod env;
pub mod file_tree;

// Re-export commonly used types
pub use config::Config;
pub use descriptor::{ClassList, EditRequest, ElementDescriptor, Mutation, Rect};
pub use file_tree::FileTree;
pub use patcher::{locate, update_code, PatchError};
pub use sandbox::{SandboxError, SandboxSession, SandboxState, ServerReady};
pub use session::{SessionController, SessionError, SessionEvent, SessionStatus};
