//! Local process runtime.
//!
//! Each boot creates a private working directory under the sandbox root.
//! Processes run there via `tokio::process` with piped output. Dev server
//! readiness is detected by scanning output lines for a local URL such as
//! Vite's `Local:   http://localhost:5173/`.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::process::{ProcessControl, ProcessHandle, UNKNOWN_EXIT_CODE};
use super::{Container, SandboxError, SandboxRuntime, ServerReady};
use crate::constants::{OUTPUT_DRAIN_TIMEOUT, OUTPUT_READ_BUFFER, SERVER_READY_CHANNEL_CAPACITY};
use crate::file_tree::FileTree;

/// Longest partial line kept while waiting for a newline.
const MAX_PENDING_LINE: usize = 8 * 1024;

/// Hosts that count as "the dev server is listening locally".
const LOCAL_URL_PREFIXES: &[&str] = &[
    "http://localhost:",
    "https://localhost:",
    "http://127.0.0.1:",
    "https://127.0.0.1:",
    "http://0.0.0.0:",
    "http://[::1]:",
];

/// Runtime that runs processes on the host in per-session directories.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    root: PathBuf,
}

impl LocalRuntime {
    /// Runtime creating session directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn boot(&self) -> Result<Arc<dyn Container>, SandboxError> {
        let workdir = self.root.join(format!("session-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| SandboxError::Boot(format!("{}: {e}", workdir.display())))?;
        log::info!("[sandbox] working directory {}", workdir.display());
        Ok(Arc::new(LocalContainer::new(workdir)))
    }
}

/// A booted local runtime instance.
#[derive(Debug)]
pub struct LocalContainer {
    workdir: PathBuf,
    ready: broadcast::Sender<ServerReady>,
}

impl LocalContainer {
    fn new(workdir: PathBuf) -> Self {
        let (ready, _) = broadcast::channel(SERVER_READY_CHANNEL_CAPACITY);
        Self { workdir, ready }
    }

    /// Project directory of this instance.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let mut saw_normal = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => saw_normal = true,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        saw_normal.then(|| self.workdir.join(relative))
    }
}

#[async_trait]
impl Container for LocalContainer {
    async fn mount(&self, tree: &FileTree) -> Result<(), SandboxError> {
        let tree = tree.clone();
        let workdir = self.workdir.clone();
        tokio::task::spawn_blocking(move || tree.write_to_dir(&workdir))
            .await
            .map_err(|e| SandboxError::Mount(e.to_string()))?
            .map_err(|e| SandboxError::Mount(e.to_string()))
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<ProcessHandle, SandboxError> {
        let mut command = Command::new(program);
        command.args(args);
        command.current_dir(&self.workdir);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        // Own process group so a kill also reaches servers forked by npm
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| SandboxError::Spawn {
            command: program.to_string(),
            reason: e.to_string(),
        })?;
        log::info!("[sandbox] spawned {program} {} (pid {:?})", args.join(" "), child.id());

        let (handle, control) = ProcessHandle::channel();
        let pumps: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|out| pump(out, control.clone(), self.ready.clone())),
            child.stderr.take().map(|err| pump(err, control.clone(), self.ready.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let name = program.to_string();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                () = control.killed() => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    log::info!("[sandbox] killing {name}");
                    terminate(&mut child, &name);
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(UNKNOWN_EXIT_CODE),
                Err(e) => {
                    log::warn!("[sandbox] failed to wait for {name}: {e}");
                    UNKNOWN_EXIT_CODE
                }
            };
            for mut pump in pumps {
                // A surviving grandchild may hold the pipe open
                if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut pump).await.is_err() {
                    log::warn!("[sandbox] output of {name} still open after exit");
                    pump.abort();
                }
            }
            control.exit(code);
        });

        Ok(handle)
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        let failed = |reason: String| SandboxError::WriteFailed {
            path: path.to_string(),
            reason,
        };
        let target = self
            .resolve(path)
            .ok_or_else(|| failed("path escapes the project directory".to_string()))?;
        let parent_exists = match target.parent() {
            Some(parent) => tokio::fs::metadata(parent).await.is_ok_and(|m| m.is_dir()),
            None => false,
        };
        if !parent_exists {
            return Err(failed("parent directory does not exist".to_string()));
        }
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| failed(e.to_string()))
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready.subscribe()
    }
}

/// Kill the child and, on unix, its whole process group.
fn terminate(child: &mut Child, name: &str) {
    #[cfg(unix)]
    {
        if let Some(pgid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: kill(2) with a negative pid only signals the group; no memory is touched
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
                return;
            }
        }
    }
    if let Err(e) = child.start_kill() {
        log::warn!("[sandbox] failed to kill {name}: {e}");
    }
}

/// Forward one output stream, announcing local URLs as they appear.
fn pump<R>(mut reader: R, control: ProcessControl, ready: broadcast::Sender<ServerReady>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; OUTPUT_READ_BUFFER];
        let mut decoder = Utf8Decoder::default();
        let mut line = String::new();
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::debug!("[sandbox] output stream closed: {e}");
                    break;
                }
            };
            let text = decoder.decode(&buf[..n]);
            if text.is_empty() {
                continue;
            }
            line.push_str(&text);
            scan_lines(&mut line, &ready);
            // Receiver gone: keep draining so the child never blocks on a full pipe
            let _ = control.emit(text);
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            line.push_str(&rest);
            let _ = control.emit(rest);
        }
        if let Some(event) = detect_server_url(&line) {
            let _ = ready.send(event);
        }
    })
}

fn scan_lines(pending: &mut String, ready: &broadcast::Sender<ServerReady>) {
    while let Some(newline) = pending.find('\n') {
        if let Some(event) = detect_server_url(&pending[..newline]) {
            log::debug!("[sandbox] detected server at {}", event.url);
            let _ = ready.send(event);
        }
        pending.drain(..=newline);
    }
    if pending.len() > MAX_PENDING_LINE {
        pending.clear();
    }
}

/// Incremental UTF-8 decoding that keeps split code points across reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            // Incomplete sequence at the end: hold it for the next read
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.carry.len(),
        };
        let text = String::from_utf8_lossy(&self.carry[..valid]).into_owned();
        self.carry.drain(..valid);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        text
    }
}

/// Remove ANSI CSI escape sequences (`ESC [ ... final`).
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

/// Find a local server URL in one line of output.
#[must_use]
pub fn detect_server_url(line: &str) -> Option<ServerReady> {
    let line = strip_ansi(line);
    let (start, prefix) = LOCAL_URL_PREFIXES
        .iter()
        .filter_map(|prefix| line.find(prefix).map(|at| (at, *prefix)))
        .min_by_key(|(at, _)| *at)?;
    let after = &line[start + prefix.len()..];
    let digits_len = after.bytes().take_while(u8::is_ascii_digit).count();
    let port: u16 = after[..digits_len].parse().ok()?;
    if port == 0 {
        return None;
    }
    let end = line[start..]
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | '>' | ','))
        .map_or(line.len(), |offset| start + offset);
    Some(ServerReady {
        port,
        url: line[start..end].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_tree::FileContents;
    use tempfile::TempDir;

    #[test]
    fn test_detects_vite_banner() {
        let line = "  \u{1b}[32m➜\u{1b}[39m  \u{1b}[1mLocal\u{1b}[22m:   \u{1b}[36mhttp://localhost:\u{1b}[1m5173\u{1b}[22m/\u{1b}[39m";
        let ready = detect_server_url(line).unwrap();
        assert_eq!(ready.port, 5173);
        assert_eq!(ready.url, "http://localhost:5173/");
    }

    #[test]
    fn test_detects_other_local_hosts() {
        let ready = detect_server_url("ready - started server on http://127.0.0.1:3000, url: x").unwrap();
        assert_eq!(ready.port, 3000);
        assert_eq!(ready.url, "http://127.0.0.1:3000");
        assert!(detect_server_url("see https://example.com:443/docs").is_none());
        assert!(detect_server_url("http://localhost:99999").is_none());
        assert!(detect_server_url("http://localhost:/").is_none());
    }

    #[test]
    fn test_decoder_keeps_split_code_points() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "➜ ok".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..]), "➜ ok");
        assert_eq!(decoder.finish(), "");
    }

    #[tokio::test]
    async fn test_write_file_rules() {
        let temp = TempDir::new().unwrap();
        let runtime = LocalRuntime::new(temp.path());
        let container = runtime.boot().await.unwrap();

        let mut tree = FileTree::new();
        tree.insert_file("src/App.tsx", FileContents::Text("export {}".to_string()))
            .unwrap();
        container.mount(&tree).await.unwrap();

        container.write_file("src/App.tsx", "changed").await.unwrap();
        assert!(matches!(
            container.write_file("missing/App.tsx", "x").await,
            Err(SandboxError::WriteFailed { .. })
        ));
        assert!(matches!(
            container.write_file("../escape.txt", "x").await,
            Err(SandboxError::WriteFailed { .. })
        ));
        assert!(matches!(
            container.write_file("/etc/passwd", "x").await,
            Err(SandboxError::WriteFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let container = LocalRuntime::new(temp.path()).boot().await.unwrap();
        let err = container
            .spawn("previewsync-definitely-missing-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_process_output_exit_and_ready() {
        let temp = TempDir::new().unwrap();
        let container = LocalRuntime::new(temp.path()).boot().await.unwrap();
        let mut ready = container.server_ready();

        let args = vec![
            "-c".to_string(),
            "printf 'starting\\n  Local: http://localhost:4321/\\n'; exit 3".to_string(),
        ];
        let handle = container.spawn("sh", &args).await.unwrap();
        let mut output = String::new();
        let code = handle.drain(|chunk| output.push_str(chunk)).await;

        assert_eq!(code, 3);
        assert!(output.contains("starting"));
        let event = ready.recv().await.unwrap();
        assert_eq!(event.port, 4321);
        assert_eq!(event.url, "http://localhost:4321/");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_stops_long_running_process() {
        let temp = TempDir::new().unwrap();
        let container = LocalRuntime::new(temp.path()).boot().await.unwrap();
        let handle = container.spawn("sleep", &["30".to_string()]).await.unwrap();
        handle.kill();
        let code = tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(code, UNKNOWN_EXIT_CODE);
    }
}
