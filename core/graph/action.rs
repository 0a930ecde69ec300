use super::ArtifactId;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A handle to an `Action` in an `ActionGraph`.
///
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub(crate) u32);

impl ActionId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Action({})", self.0)
    }
}

/// The opaque command an action runs: an executable, its arguments, and the only environment
/// variables it is allowed to see when sandboxed.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSpec {
    pub executable: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// A command that runs `script` through `/bin/sh -c`.
    pub fn shell<S: Into<String>>(script: S) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Declared resource requirements. These are carried through to strategies and diagnostics,
/// the scheduler only bounds concurrency by worker count.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default)]
    pub cpus: Option<u32>,

    #[serde(default)]
    pub memory_mb: Option<u64>,
}

/// A unit of build work.
///
/// Actions are built once, before execution begins, and never change afterwards.
///
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(error = "ActionSpecError"))]
pub struct Action {
    /// The label of whatever declared this action, for diagnostics.
    #[builder(setter(into))]
    owner: String,

    /// A short name for the kind of work this action does, such as `Compile` or `Copy`.
    #[builder(setter(into), default = "String::from(\"Action\")")]
    mnemonic: String,

    #[builder(default)]
    inputs: Vec<ArtifactId>,

    #[builder(default)]
    outputs: Vec<ArtifactId>,

    #[builder(default)]
    command: CommandSpec,

    #[builder(default)]
    resources: ResourceHints,

    #[builder(setter(strip_option), default)]
    timeout: Option<Duration>,

    /// The name of the strategy this action must run with, overriding the configured ones.
    #[builder(setter(into, strip_option), default)]
    strategy: Option<String>,
}

impl Action {
    pub fn builder() -> ActionBuilder {
        ActionBuilder::default()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// The artifacts this action consumes, in declaration order.
    pub fn inputs(&self) -> &[ArtifactId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ArtifactId] {
        &self.outputs
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn resources(&self) -> &ResourceHints {
        &self.resources
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn strategy(&self) -> Option<&str> {
        self.strategy.as_deref()
    }
}

#[derive(Error, Debug)]
pub enum ActionSpecError {
    #[error("Attempted to build an Action while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for ActionSpecError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}
