use super::{BuildResults, Context, Coordinator, ReadinessTracker, WorkerError};
use crate::cache::{ActionCache, InflightExecutions};
use crate::events::EventChannel;
use crate::graph::ActionGraph;
use crate::strategy::{ExecutionContext, StrategyRegistry};
use crate::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A shared execution context for workers. This includes all of subsystems that need to be
/// available for workers to execute their work correctly:
/// * the graph being executed, read-only
/// * the Readiness Tracker, the only mutable state, behind a single lock
/// * a Coordinator that helps initialize the shutdown sequence
/// * the Strategy Registry, the Action Cache and the table of in-flight keys
/// * the Execution Context every strategy receives
///
#[derive(Clone, Debug)]
pub struct SharedContext {
    pub(crate) graph: Arc<ActionGraph>,
    pub(crate) tracker: Arc<Mutex<ReadinessTracker>>,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) strategies: Arc<StrategyRegistry>,
    pub(crate) cache: Arc<dyn ActionCache>,
    pub(crate) inflight: Arc<InflightExecutions>,
    pub(crate) exec_ctx: ExecutionContext,
    pub(crate) event_channel: Arc<EventChannel>,
    pub(crate) options: ExecutionOptions,
}

/// The subset of `Config` workers need to know about.
///
#[derive(Copy, Clone, Debug)]
pub struct ExecutionOptions {
    pub use_cache: bool,
    pub keep_going: bool,
    pub default_timeout: Option<Duration>,
}

impl SharedContext {
    pub fn new(
        graph: Arc<ActionGraph>,
        strategies: Arc<StrategyRegistry>,
        cache: Arc<dyn ActionCache>,
        inflight: Arc<InflightExecutions>,
        exec_ctx: ExecutionContext,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(ReadinessTracker::new(graph.clone()))),
            coordinator: Arc::new(Coordinator::new()),
            event_channel: exec_ctx.event_channel.clone(),
            graph,
            strategies,
            cache,
            inflight,
            exec_ctx,
            options,
        }
    }

    /// Lock the tracker. The guard must never be held across an `.await`.
    pub(crate) fn tracker(&self) -> Result<MutexGuard<'_, ReadinessTracker>, WorkerError> {
        self.tracker.lock().map_err(|_| WorkerError::StatePoisoned)
    }
}

impl Context for SharedContext {
    fn results(&self) -> Result<BuildResults, WorkerError> {
        Ok(self.tracker()?.results())
    }

    fn shutdown(&self) {
        self.coordinator.signal_shutdown();
    }
}
