//! # Parallel execution of an action graph
//!
//! A `WorkerPool` spins up one `LocalWorker` per allowed concurrent action. Workers share a
//! `SharedContext`, and through it a single `ReadinessTracker` that hands out actions as soon as
//! everything they consume has been produced.
//!

mod context;
mod coordinator;
mod error;
mod local_worker;
mod pool;
mod results;
mod tracker;

pub use context::*;
pub use coordinator::*;
pub use error::*;
pub use local_worker::*;
pub use pool::*;
pub use results::*;
pub use tracker::*;

use async_trait::async_trait;

/// A Context object used across workers. It must be thread-safe and shareable, but the things it
/// contains do not need to be.
///
/// It needs a way to extract the results of the execution, and a way to stop every worker when
/// one of them can't go on.
///
pub trait Context: Sync + Send + Clone + Sized {
    fn results(&self) -> Result<BuildResults, WorkerError>;

    fn shutdown(&self);
}

/// A worker in the Worker Pool.
///
/// This trait is used to build specific workers that are usable within the WorkerPool. It requires
/// you to specify a type of context that implements the [Context] trait.
///
/// Normally workers have a set up that happens during the `run` phase, so their construction is
/// sync.
///
#[async_trait(?Send)]
pub trait Worker {
    type Context: Context;

    fn new(role: Role, ctx: Self::Context) -> Result<Self, WorkerError>
    where
        Self: Sized;

    async fn run(&mut self) -> Result<(), WorkerError>;
}

/// The role that a given worker has. The MainWorker is in charge of terminating execution
/// normally, whereas the HelperWorker(id) are there to run more actions at once.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    MainWorker,
    HelperWorker(usize),
}

impl Role {
    pub fn is_main_worker(&self) -> bool {
        matches!(&self, Role::MainWorker)
    }
}
