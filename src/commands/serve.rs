//! `serve`: run a project in a local sandbox and report its preview URL.
//!
//! Loads the project directory (or the built-in Vite + React template when
//! the directory has no `package.json`), drives a session through install and
//! dev-server start, and streams process output until Ctrl-C.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::file_tree::FileTree;
use crate::sandbox::local::LocalRuntime;
use crate::sandbox::SandboxSession;
use crate::session::{SessionController, SessionEvent, SessionStatus};

/// Load the project at `dir`, falling back to the template.
pub fn load_project(dir: &Path) -> Result<FileTree> {
    if dir.join("package.json").is_file() {
        FileTree::from_dir(dir).with_context(|| format!("Failed to load project {}", dir.display()))
    } else {
        log::info!(
            "No package.json in {}, using the built-in template",
            dir.display()
        );
        Ok(FileTree::vite_react_template())
    }
}

/// Run the session until Ctrl-C.
pub fn run(project_dir: &Path, config: &Config) -> Result<()> {
    let tree = load_project(project_dir)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(tree, config))
}

async fn serve(tree: FileTree, config: &Config) -> Result<()> {
    let sandbox = Arc::new(SandboxSession::new(
        Arc::new(LocalRuntime::new(&config.sandbox_root)),
        config.sandbox_limits()?,
    ));
    let (controller, mut events) =
        SessionController::new(Arc::clone(&sandbox), tree, config.entry_file.clone());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Output { chunk, .. } => print!("{chunk}"),
                SessionEvent::ServerReady { url, .. } => println!("\nPreview ready at {url}"),
                SessionEvent::InstallFailed { exit_code } => {
                    eprintln!("Dependency install failed with exit code {exit_code}");
                }
                SessionEvent::Status(SessionStatus::Failed { message }) => {
                    eprintln!("Session failed: {message}");
                }
                other => log::debug!("{other:?}"),
            }
        }
    });

    if let Err(e) = controller.start().await {
        if e.is_fatal() {
            controller.shutdown().await;
            printer.abort();
            return Err(e).context("Session failed to start");
        }
        eprintln!("{e}");
    }

    println!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Ctrl-C received, shutting down");
    controller.shutdown().await;
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_project_uses_template_without_package_json() {
        let temp = TempDir::new().unwrap();
        let tree = load_project(temp.path()).unwrap();
        assert!(tree.read_text("src/App.tsx").is_some());
        assert!(tree.read_text("package.json").is_some());
    }

    #[test]
    fn test_load_project_reads_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir_all(temp.path().join("node_modules/react")).unwrap();
        std::fs::write(temp.path().join("node_modules/react/index.js"), "").unwrap();
        let tree = load_project(temp.path()).unwrap();
        assert_eq!(tree.read_text("package.json"), Some("{}"));
        assert!(tree.get("node_modules").is_none());
    }
}
