//! CLI subcommand implementations for previewsync.
//!
//! - [`patch`] - Offline patching and element lookup
//! - [`serve`] - Run a project in a local sandbox

pub mod patch;
pub mod serve;

#[doc(inline)]
pub use patch::{locate, patch};
