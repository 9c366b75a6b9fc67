//! Offline patch and locate commands.
//!
//! Run the element patcher against a file on disk without a sandbox. Handy
//! for checking how an edit would land before wiring up a live session.
//!
//! # Examples
//!
//! ```bash
//! # Print the patched file
//! previewsync patch src/App.tsx --tag button --class "a b" --set "c d e"
//!
//! # Patch in place
//! previewsync patch src/App.tsx --tag button --class "a b" --set "c d e" --write
//!
//! # Where is the element?
//! previewsync locate src/App.tsx --tag button --class "a b"
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::descriptor::{EditRequest, ElementDescriptor, Mutation};
use crate::patcher;

/// Apply a class change to the first matching element in `file`.
///
/// Prints the result to stdout, or writes it back when `write` is set.
/// The file is never modified when the element cannot be found.
pub fn patch(file: &Path, tag: &str, class: &str, classes: &str, write: bool) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let updated = patch_source(&source, tag, class, classes)
        .with_context(|| format!("Failed to patch {}", file.display()))?;

    if write {
        if updated != source {
            fs::write(file, &updated)
                .with_context(|| format!("Failed to write {}", file.display()))?;
        }
        println!("Updated {}", file.display());
    } else {
        print!("{updated}");
    }
    Ok(())
}

/// Patch `source` in memory.
pub fn patch_source(source: &str, tag: &str, class: &str, classes: &str) -> Result<String> {
    let request = EditRequest::new(ElementDescriptor::new(tag, class), Mutation::set_classes(classes));
    Ok(patcher::update_code(source, &request)?)
}

/// Print `line:column` of the first matching element in `file`.
pub fn locate(file: &Path, tag: &str, class: &str) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let located = patcher::locate(&source, &ElementDescriptor::new(tag, class))
        .with_context(|| format!("Failed to locate element in {}", file.display()))?;
    println!("{}:{}:{}", file.display(), located.line, located.column);
    Ok(())
}
