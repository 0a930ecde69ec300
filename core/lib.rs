//! # Kiln Core
//!
//! The flow begins by creating a `Config` struct and using it to build a new `KilnDrive`. From
//! there, `KilnDrive` takes an already-validated `ActionGraph` and orchestrates a `SharedContext`
//! and a `WorkerPool` to execute every action in it, returning the collected `BuildResults`.
//!
//! Each action is checked against the `ActionCache` before anything is dispatched. Misses are
//! handed to the `ExecutionStrategy` selected for the action: local, sandboxed, or remote.
//!

pub mod cache;
pub(crate) mod config;
pub(crate) mod drive;
pub mod events;
pub mod fingerprint;
pub mod graph;
pub mod sandbox;
pub mod strategy;
pub(crate) mod sync;
pub(crate) mod util;
pub mod worker;

pub use config::*;
pub use drive::*;
pub use fingerprint::{ActionKey, Fingerprint};
pub use graph::{
    Action, ActionGraph, ActionGraphBuilder, ActionId, Artifact, ArtifactId, ArtifactKind,
    CommandSpec, GraphError, ResourceHints, Root,
};
pub use worker::{ActionError, ActionState, BuildResults, CacheStatus};

#[macro_use]
extern crate derive_builder;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
