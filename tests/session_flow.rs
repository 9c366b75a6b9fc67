// End-to-end session tests against the local runtime
// Run with: cargo test --test session_flow
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use previewsync::descriptor::ElementDescriptor;
use previewsync::file_tree::FileTree;
use previewsync::sandbox::local::LocalRuntime;
use previewsync::sandbox::{SandboxLimits, SandboxSession};
use previewsync::session::{EditOutcome, SessionController, SessionError, SessionEvent, SessionStatus};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn limits(install: &str, dev: &str) -> SandboxLimits {
    SandboxLimits {
        install_program: "sh".to_string(),
        install_args: vec!["-c".to_string(), install.to_string()],
        dev_program: "sh".to_string(),
        dev_args: vec!["-c".to_string(), dev.to_string()],
        ..SandboxLimits::default()
    }
}

async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_template_project_serves_and_accepts_edits() {
    let temp = TempDir::new().unwrap();
    let sandbox = Arc::new(SandboxSession::new(
        Arc::new(LocalRuntime::new(temp.path())),
        limits(
            "test -f package.json && echo installed",
            "echo '  Local:   http://localhost:5173/'; exec sleep 30",
        ),
    ));
    let (controller, mut events) =
        SessionController::new(Arc::clone(&sandbox), FileTree::vite_react_template(), "src/App.tsx");

    controller.start().await.unwrap();
    let ready = wait_for(&mut events, |e| matches!(e, SessionEvent::ServerReady { .. })).await;
    assert_eq!(
        ready,
        SessionEvent::ServerReady {
            port: 5173,
            url: "http://localhost:5173/".to_string()
        }
    );

    controller.select(ElementDescriptor::new("h1", "title")).unwrap();
    let outcome = controller.apply_class_change("title text-4xl").await.unwrap();
    assert!(matches!(outcome, EditOutcome::Applied { changed: true, .. }));

    let session_dir = std::fs::read_dir(temp.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let written = std::fs::read_to_string(session_dir.join("src/App.tsx")).unwrap();
    assert!(written.contains(r#"<h1 className="title text-4xl">Vite + React</h1>"#));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_failed_install_never_starts_dev_server() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("dev-started");
    let sandbox = Arc::new(SandboxSession::new(
        Arc::new(LocalRuntime::new(temp.path().join("sandboxes"))),
        limits(
            "echo 'npm ERR! missing script' >&2; exit 1",
            &format!("touch {}", marker.display()),
        ),
    ));
    let (controller, mut events) =
        SessionController::new(sandbox, FileTree::vite_react_template(), "src/App.tsx");

    let err = controller.start().await.unwrap_err();
    assert_eq!(err, SessionError::InstallFailed { exit_code: 1 });
    assert_eq!(controller.status(), SessionStatus::InstallFailed { exit_code: 1 });

    let output = wait_for(&mut events, |e| matches!(e, SessionEvent::Output { .. })).await;
    match output {
        SessionEvent::Output { chunk, .. } => assert!(chunk.contains("npm ERR!")),
        other => panic!("unexpected event {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!marker.exists());
}
