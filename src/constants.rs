//! Application-wide constants for previewsync.
//!
//! Centralizes magic numbers so they are discoverable in one place.
//!
//! # Categories
//!
//! - **Timeouts**: sandbox process limits
//! - **Channels**: broadcast and event channel capacities
//! - **Project**: default commands and file names

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Default upper bound for booting a sandbox.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound for the dependency install process.
///
/// Installs are slow on cold caches; ten minutes covers a full `npm install`
/// of a typical Vite project on a poor connection.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// Channels
// ============================================================================

/// Capacity of the server-ready broadcast channel inside a container.
///
/// Readiness events are rare; a small buffer is plenty.
pub const SERVER_READY_CHANNEL_CAPACITY: usize = 16;

/// How long output pumps may keep reading after their process exited.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Read buffer size for process output pumps.
pub const OUTPUT_READ_BUFFER: usize = 4096;

// ============================================================================
// Project
// ============================================================================

/// Default dependency installation command.
pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";

/// Default development server command.
pub const DEFAULT_DEV_COMMAND: &str = "npm run dev";

/// Default file that owns selectable elements.
pub const DEFAULT_ENTRY_FILE: &str = "src/App.tsx";

/// Directory names skipped when loading a project from disk.
pub const IGNORED_PROJECT_DIRS: &[&str] = &["node_modules", ".git", "dist"];

/// Name of the per-session sandbox directory prefix.
pub const SANDBOX_DIR_PREFIX: &str = "previewsync-sandbox";
