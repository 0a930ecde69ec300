use super::ExecutionError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::*;

/// How much of the end of stderr is kept in a `NonZeroExit` error.
const STDERR_TAIL_BYTES: u64 = 4096;

/// A fully resolved subprocess invocation.
///
#[derive(Debug)]
pub(crate) struct CommandRun<'a> {
    pub executable: &'a Path,
    pub args: &'a [String],
    pub cwd: &'a Path,
    pub env: HashMap<String, String>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub timeout: Option<Duration>,
    pub abort: &'a CancellationToken,
}

enum Finished {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Aborted,
}

/// Run a command to completion, in its own process group, with exactly the environment given.
///
/// Returns the exit code when the command succeeds. On timeout or abort the whole process group
/// is killed, so that nothing the command started outlives it.
///
#[tracing::instrument(name = "spawn::run_command", skip(run), fields(kiln.executable = ?run.executable))]
pub(crate) async fn run_command(run: CommandRun<'_>) -> Result<i32, ExecutionError> {
    let stdout = create_log(&run.stdout)?;
    let stderr = create_log(&run.stderr)?;

    // A relative path with a directory component refers to a file in the working directory,
    // a bare name is looked up in the PATH we hand to the command.
    let program = if run.executable.is_relative() && run.executable.components().count() > 1 {
        run.cwd.join(run.executable)
    } else {
        run.executable.to_path_buf()
    };

    let mut cmd = Command::new(&program);
    cmd.args(run.args)
        .current_dir(run.cwd)
        .env_clear()
        .envs(run.env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    trace!("Running {:?} {:?} in {:?}", program, run.args, run.cwd);

    let mut child = cmd.spawn().map_err(|err| ExecutionError::Spawn {
        executable: program.clone(),
        err,
    })?;
    let pid = child.id();

    let deadline = async {
        match run.timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                timeout
            }
            None => futures::future::pending().await,
        }
    };

    let finished = tokio::select! {
        status = child.wait() => Finished::Exited(status),
        timeout = deadline => Finished::TimedOut(timeout),
        _ = run.abort.cancelled() => Finished::Aborted,
    };

    match finished {
        Finished::Exited(Ok(status)) if status.success() => Ok(0),
        Finished::Exited(Ok(status)) => Err(ExecutionError::NonZeroExit {
            exit_code: exit_code(&status),
            stderr: read_tail(&run.stderr).await,
        }),
        Finished::Exited(Err(err)) => Err(ExecutionError::Spawn {
            executable: program,
            err,
        }),
        Finished::TimedOut(timeout) => {
            debug!("{:?} timed out after {:?}, killing it", program, timeout);
            kill_process_group(pid);
            let _ = child.kill().await;
            Err(ExecutionError::Timeout { timeout })
        }
        Finished::Aborted => {
            debug!("{:?} was aborted, killing it", program);
            kill_process_group(pid);
            let _ = child.kill().await;
            Err(ExecutionError::Aborted)
        }
    }
}

fn create_log(path: &Path) -> Result<std::fs::File, ExecutionError> {
    let create = || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(path)
    };
    create().map_err(|err| ExecutionError::CouldNotCreateLog {
        path: path.to_path_buf(),
        err,
    })
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("Could not kill process group {} due to {:?}", pid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn read_tail(path: &Path) -> String {
    let read = async {
        let mut file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        file.seek(std::io::SeekFrom::Start(len.saturating_sub(STDERR_TAIL_BYTES)))
            .await?;
        let mut bytes = vec![];
        file.read_to_end(&mut bytes).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&bytes).to_string())
    };
    read.await.unwrap_or_default()
}
