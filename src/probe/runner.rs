//! External process execution with deadline and cancellation.
//!
//! Output is drained incrementally into shared buffers so whatever a tool
//! printed before being killed is still returned. On unix the child leads
//! its own process group and the whole group is killed on every exit path.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::{CommandSpec, Completion, RawExecution};

/// How long reader tasks get to flush after the process is gone
const READER_GRACE: Duration = Duration::from_millis(500);

/// Runs one external command to completion, timeout or cancellation
///
/// Never fails: tool errors are carried by exit code and stderr, and a
/// missing binary is reported as `Completion::ProgramNotFound`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RawExecution;
}

/// Runner spawning real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RawExecution {
        let start = Instant::now();

        let Some(path) = resolve_program(&command.program) else {
            debug!(program = %command.program, "program not found on PATH");
            return RawExecution::program_not_found(command.clone());
        };

        let mut cmd = Command::new(&path);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(program = %command.program, error = %e, "program not executable");
                return RawExecution::program_not_found(command.clone());
            }
            Err(e) => {
                warn!(command = %command, error = %e, "failed to spawn");
                return RawExecution::new(
                    command.clone(),
                    Completion::Completed,
                    None,
                    String::new(),
                    e.to_string(),
                    start.elapsed(),
                );
            }
        };

        // Kills the process group even if this future is dropped mid-await
        let group = scopeguard::guard(child.id(), kill_group);

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|p| tokio::spawn(drain(p, stdout_buf.clone()))),
            child.stderr.take().map(|p| tokio::spawn(drain(p, stderr_buf.clone()))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let (completion, exit_code) = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => (Completion::Completed, status.code()),
                Err(e) => {
                    warn!(command = %command, error = %e, "failed to wait on child");
                    (Completion::Completed, None)
                }
            },
            _ = tokio::time::sleep(timeout) => (Completion::TimedOut, None),
            _ = cancel.cancelled() => (Completion::Killed, None),
        };

        // Leftover grandchildren may hold the pipes open; take the group down.
        // The guard is disarmed here and only fires if this future is dropped.
        kill_group(scopeguard::ScopeGuard::into_inner(group));
        if completion != Completion::Completed {
            debug!(command = %command, ?completion, "killing process");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        for reader in readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(READER_GRACE, reader).await.is_err() {
                abort.abort();
            }
        }

        let stdout = String::from_utf8_lossy(&stdout_buf.lock()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf.lock()).into_owned();

        RawExecution::new(
            command.clone(),
            completion,
            exit_code,
            stdout,
            stderr,
            start.elapsed(),
        )
    }
}

async fn drain<R>(mut pipe: R, buf: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid
        && let Ok(pgid) = libc::pid_t::try_from(pid)
    {
        // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Locate `program` the way a shell would, without spawning anything
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    let path = Path::new(program);
    if path.is_absolute() || path.components().count() > 1 {
        return is_executable(path).then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| candidates(&dir, program))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(program)];
    if Path::new(program).extension().is_none() {
        for ext in ["exe", "com", "bat", "cmd"] {
            out.push(dir.join(format!("{}.{}", program, ext)));
        }
    }
    out
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
