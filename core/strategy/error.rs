use super::RemoteError;
use crate::fingerprint::FingerprintError;
use crate::sandbox::SandboxError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command exited with code {exit_code}:\n{stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Command did not produce the declared outputs: {missing:?}")]
    MissingOutputs { missing: Vec<PathBuf> },

    #[error("Command was killed after running for {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Command was aborted")]
    Aborted,

    #[error("Could not spawn {executable:?} due to {err:?}")]
    Spawn {
        executable: PathBuf,
        err: std::io::Error,
    },

    #[error("Could not create log file {path:?} due to {err:?}")]
    CouldNotCreateLog { path: PathBuf, err: std::io::Error },

    #[error("Could not prepare the working directory at {path:?} due to {err:?}")]
    CouldNotPrepare { path: PathBuf, err: std::io::Error },

    #[error(transparent)]
    Materialization(SandboxError),

    #[error("Could not move output {src:?} to {dst:?} due to {err:?}")]
    Relocation {
        src: PathBuf,
        dst: PathBuf,
        err: std::io::Error,
    },

    #[error(transparent)]
    Fingerprint(FingerprintError),

    #[error(transparent)]
    Remote(RemoteError),

    #[error("Strategy panicked: {reason}")]
    Panicked { reason: String },
}

impl From<SandboxError> for ExecutionError {
    fn from(err: SandboxError) -> Self {
        ExecutionError::Materialization(err)
    }
}

impl From<FingerprintError> for ExecutionError {
    fn from(err: FingerprintError) -> Self {
        ExecutionError::Fingerprint(err)
    }
}

impl From<RemoteError> for ExecutionError {
    fn from(err: RemoteError) -> Self {
        ExecutionError::Remote(err)
    }
}
