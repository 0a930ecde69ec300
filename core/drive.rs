use super::*;
use crate::cache::{ActionCache, InflightExecutions, LocalActionCache};
use crate::events::{QueueEvent, WorkflowEvent};
use crate::graph::{Action, ActionGraph};
use crate::sandbox::SandboxManager;
use crate::strategy::{
    ExecutionContext, ExecutionStrategy, LocalStrategy, RemoteStrategy, RemoteTransport,
    SandboxedStrategy, StrategyRegistry,
};
use crate::sync::Arc;
use crate::worker::{ExecutionOptions, LocalWorker, SharedContext, WorkerPool, WorkerPoolError};
use std::path::PathBuf;
use thiserror::*;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, *};

/// # Kiln Drive
///
/// This struct orchestrates the top-level flow of Kiln.
///
/// Here we register the execution strategies, open the `ActionCache`, and for every graph we are
/// asked to execute we set up a fresh `SharedContext` and `WorkerPool`.
///
/// The cache and the table of in-flight action keys outlive a single execution, so executing
/// the same graph twice on one drive runs nothing the second time.
///
pub struct KilnDrive {
    config: Config,
    strategies: StrategyRegistry,
    cache: Arc<dyn ActionCache>,
    inflight: Arc<InflightExecutions>,
    abort: CancellationToken,
}

impl KilnDrive {
    #[instrument(name = "KilnDrive::new")]
    pub fn new(config: Config) -> Result<Self, KilnDriveError> {
        let mut strategies = StrategyRegistry::from_config(&config);

        let local: Arc<dyn ExecutionStrategy> = Arc::new(LocalStrategy::new());
        strategies.register_strategy(LocalStrategy::NAME, local.clone());
        strategies.register_strategy(LocalStrategy::ALIAS, local);

        let sandboxed: Arc<dyn ExecutionStrategy> = Arc::new(SandboxedStrategy::new(
            SandboxManager::from_config(&config),
        ));
        strategies.register_strategy(SandboxedStrategy::NAME, sandboxed.clone());
        strategies.register_strategy(SandboxedStrategy::ALIAS, sandboxed);

        strategies.register_strategy(RemoteStrategy::NAME, Arc::new(RemoteStrategy::default()));

        let cache: Arc<dyn ActionCache> = Arc::new(LocalActionCache::from_config(&config));

        Ok(Self {
            config,
            strategies,
            cache,
            inflight: Arc::new(InflightExecutions::new()),
            abort: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send actions selecting the `remote` strategy through `transport`.
    pub fn with_remote_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.strategies.register_strategy(
            RemoteStrategy::NAME,
            Arc::new(RemoteStrategy::new(Some(transport))),
        );
        self
    }

    /// Replace the local result cache.
    pub fn with_cache(mut self, cache: Arc<dyn ActionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Register `strategy` under `name`, replacing any strategy registered there before.
    pub fn register_strategy<S: Into<String>>(
        &mut self,
        name: S,
        strategy: Arc<dyn ExecutionStrategy>,
    ) {
        self.strategies.register_strategy(name, strategy);
    }

    /// The name of the strategy that would run `action`.
    pub fn select_strategy<'a>(&'a self, action: &'a Action) -> &'a str {
        self.strategies.select_strategy(action)
    }

    /// Stop every execution on this drive. Actions that have not started yet fail as cancelled,
    /// running subprocesses are killed. An aborted drive stays aborted.
    ///
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// A handle that aborts this drive from somewhere else, like a signal handler.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Execute every action in `graph`.
    ///
    /// A failing action never stops this call from returning `Ok`: per-action failures are
    /// collected in the returned `BuildResults`. Errors are only returned when the drive itself
    /// could not run.
    ///
    #[instrument(name = "KilnDrive::execute", skip(self, graph))]
    pub async fn execute(&self, graph: Arc<ActionGraph>) -> Result<BuildResults, KilnDriveError> {
        let event_channel = self.config.event_channel();
        event_channel.send(WorkflowEvent::build_started());

        for dir in [
            self.config.output_root(),
            self.config.cache_root(),
            self.config.sandbox_root(),
            self.config.exec_root(),
        ] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| KilnDriveError::CouldNotCreateDir {
                    path: dir.clone(),
                    err,
                })?;
        }

        event_channel.send(QueueEvent::ActionsQueued {
            action_count: graph.len() as u64,
        });

        let exec_ctx = ExecutionContext::from_config(&self.config, self.abort.child_token());
        let options = ExecutionOptions {
            use_cache: self.config.use_cache(),
            keep_going: self.config.keep_going(),
            default_timeout: self.config.default_timeout(),
        };

        let ctx = SharedContext::new(
            graph,
            Arc::new(self.strategies.clone()),
            self.cache.clone(),
            self.inflight.clone(),
            exec_ctx,
            options,
        );

        let worker_pool: WorkerPool<LocalWorker> =
            WorkerPool::from_shared_context(ctx, self.config.max_local_workers());
        let results = worker_pool.execute().await?;

        if self.abort.is_cancelled() {
            event_channel.send(WorkflowEvent::BuildAborted);
        }
        event_channel.send(WorkflowEvent::build_completed());

        debug!(
            "Build finished: {} actions, {} failed",
            results.len(),
            results.failures().len()
        );

        Ok(results)
    }
}

#[derive(Error, Debug)]
pub enum KilnDriveError {
    #[error(transparent)]
    WorkerPoolError(WorkerPoolError),

    #[error("Could not create directory {path:?} due to {err:?}")]
    CouldNotCreateDir {
        path: PathBuf,
        err: std::io::Error,
    },
}

impl From<WorkerPoolError> for KilnDriveError {
    fn from(err: WorkerPoolError) -> Self {
        Self::WorkerPoolError(err)
    }
}
