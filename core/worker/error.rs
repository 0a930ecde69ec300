use crate::fingerprint::FingerprintError;
use crate::strategy::{ExecutionError, StrategyError};
use std::path::PathBuf;
use thiserror::Error;

/// Why a single action did not succeed. None of these stop the rest of the build.
///
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Could not run with strategy {strategy:?}: {reason}")]
    StrategyUnavailable {
        strategy: String,
        reason: StrategyError,
    },

    #[error(transparent)]
    Execution(ExecutionError),

    #[error("Could not fingerprint input {path:?}: {err}")]
    InputFingerprint {
        path: PathBuf,
        err: FingerprintError,
    },

    #[error("Skipped because {dependency} failed")]
    DependencyFailed { dependency: String },

    #[error("Cancelled before it could run")]
    Cancelled,
}

impl From<ExecutionError> for ActionError {
    fn from(err: ExecutionError) -> Self {
        ActionError::Execution(err)
    }
}

impl From<StrategyError> for ActionError {
    fn from(reason: StrategyError) -> Self {
        let strategy = match &reason {
            StrategyError::NotRegistered { strategy } => strategy.clone(),
            StrategyError::Unavailable { strategy } => strategy.clone(),
        };
        ActionError::StrategyUnavailable { strategy, reason }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("The shared build state was poisoned by a panicking worker")]
    StatePoisoned,
}

#[derive(Error, Debug)]
pub enum WorkerPoolError {
    #[error(transparent)]
    WorkerError(WorkerError),

    #[error("A worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<WorkerError> for WorkerPoolError {
    fn from(err: WorkerError) -> Self {
        Self::WorkerError(err)
    }
}
