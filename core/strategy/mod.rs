//! # Execution Strategies
//!
//! A strategy knows how to run one resolved action, the `Spawn`, and hand back the fingerprints of
//! its outputs once they are in the output tree. Which strategy runs an action is decided by the
//! `StrategyRegistry`.
//!
mod context;
mod error;
mod local;
mod outputs;
mod registry;
mod remote;
mod sandboxed;
pub(crate) mod spawn;

pub use context::*;
pub use error::*;
pub use local::*;
pub use registry::*;
pub use remote::*;
pub use sandboxed::*;

use crate::fingerprint::{ActionKey, Fingerprint};
use crate::graph::{ArtifactKind, CommandSpec, ResourceHints};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// An input of a `Spawn`, placed at `path` (relative to the working directory) from wherever it
/// currently lives on disk.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnInput {
    pub path: PathBuf,
    pub location: PathBuf,
    pub kind: ArtifactKind,
}

/// An output a `Spawn` must leave at `path` (relative to the working directory).
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnOutput {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Everything a strategy needs to know to run one action.
///
#[derive(Clone, Debug)]
pub struct Spawn {
    pub owner: String,
    pub mnemonic: String,
    pub key: ActionKey,
    pub command: CommandSpec,
    pub inputs: Vec<SpawnInput>,
    pub outputs: Vec<SpawnOutput>,
    pub resources: ResourceHints,
    pub timeout: Option<Duration>,
}

/// The result of a successful execution. Every output listed here is already in the output tree.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub outputs: Vec<(PathBuf, Fingerprint)>,
    pub wall_time: Duration,
}

#[async_trait]
pub trait ExecutionStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn execute(
        &self,
        spawn: &Spawn,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError>;
}
