//! Scoped execution of external tools
//!
//! Every child is spawned with `kill_on_drop`, so it is terminated on every
//! exit path: normal completion, an error in the caller, or cancellation.
//! On unix the child leads its own process group; cancellation signals the
//! whole group so helpers it started (yt-dlp's ffmpeg) go down with it.

use crate::error::ProcessError;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Time a cancelled tool gets to exit after SIGTERM before SIGKILL.
#[cfg(unix)]
const TERM_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Captured result of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout followed by stderr, trimmed, for diagnostics
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Run `program` to completion unless `cancel` fires first.
///
/// On cancellation the child and its process group are terminated and
/// `ProcessError::Cancelled` returned.
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Running {:?}", cmd.as_std());

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        tool: program.display().to_string(),
        source,
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::select! {
        output = collect_output(&mut child, stdout, stderr) => Some(output),
        _ = cancel.cancelled() => None,
    };

    match finished {
        Some(output) => Ok(output?),
        None => {
            debug!("Cancelled, terminating {}", program.display());
            terminate(&mut child).await;
            Err(ProcessError::Cancelled)
        }
    }
}

async fn collect_output<O, E>(
    child: &mut Child,
    stdout: Option<O>,
    stderr: Option<E>,
) -> std::io::Result<ToolOutput>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let (status, stdout, stderr) =
        tokio::try_join!(child.wait(), read_all(stdout), read_all(stderr))?;
    Ok(ToolOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGTERM the child's process group, then SIGKILL whatever is left.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    let Some(pgid) = child.id() else {
        return;
    };

    signal_group(pgid, libc::SIGTERM);
    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        debug!("Process group {} ignored SIGTERM", pgid);
    }
    // Grandchildren may outlive the leader
    signal_group(pgid, libc::SIGKILL);
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.kill().await;
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    let result = unsafe { libc::killpg(pgid, signal) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!("killpg({}, {}) failed: {}", pgid, signal, err);
        }
    }
}
