use super::*;
use crate::cache::{CacheEntry, CachedOutput};
use crate::events::{CacheEvent, QueueEvent, WorkerEvent};
use crate::fingerprint::{ActionKey, Fingerprint};
use crate::graph::{ActionGraph, ActionId, ArtifactId, ArtifactKind};
use crate::strategy::{ExecutionError, ExecutionResult, Spawn, SpawnInput, SpawnOutput};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::*;

/// A local execution worker.
///
/// The `LocalWorker` runs one action at a time, taken from the `ReadinessTracker` that lives in
/// the `SharedContext`. It orchestrates its lifecycle by checking with the `Coordinator`.
///
/// Its flow goes:
///
/// ```text
/// loop
///   -> next ready action
///   -> fingerprint inputs and compute the action key
///   -> lock the key
///   -> cache lookup -> restore outputs -> complete as Cached
///   -> select strategy -> execute -> store in cache -> complete as Succeeded
///   -> on any error, fail the action and its dependents
/// until every action is terminal, when the main worker signals shutdown
/// ```
///
#[derive(Debug)]
pub struct LocalWorker {
    role: Role,
    ctx: SharedContext,
}

enum ActionFlow {
    Completed {
        outcome: ActionOutcome,
        state: ActionState,
    },
    Failed(ActionError),
}

#[async_trait(?Send)]
impl Worker for LocalWorker {
    type Context = SharedContext;

    fn new(role: Role, ctx: Self::Context) -> Result<Self, WorkerError> {
        Ok(Self { role, ctx })
    }

    async fn run(&mut self) -> Result<(), WorkerError> {
        while self.ctx.coordinator.should_run() {
            // NOTE: we don't want idle workers to burn CPU cycles
            tokio::time::sleep(Duration::from_micros(10)).await;

            if let Err(err) = self.poll().await {
                self.ctx.coordinator.signal_shutdown();
                return Err(err);
            }

            if self.role.is_main_worker() && self.ctx.tracker()?.is_done() {
                self.ctx.coordinator.signal_shutdown();
                break;
            }
        }
        Ok(())
    }
}

impl LocalWorker {
    #[tracing::instrument(name = "LocalWorker::poll", skip(self))]
    pub async fn poll(&mut self) -> Result<(), WorkerError> {
        if self.ctx.exec_ctx.abort.is_cancelled() {
            let cancelled = self.ctx.tracker()?.cancel_pending();
            if cancelled > 0 {
                debug!("Cancelled {} actions after an abort", cancelled);
            }
        }

        let id = match self.ctx.tracker()?.next_ready() {
            Some(id) => id,
            None => return Ok(()),
        };

        let action = self.ctx.graph.action(id);
        self.ctx.event_channel.send(QueueEvent::ActionReady {
            owner: action.owner().to_string(),
            mnemonic: action.mnemonic().to_string(),
        });

        match self.handle_action(id).await? {
            ActionFlow::Completed { outcome, state } => {
                self.ctx.event_channel.send(WorkerEvent::ActionCompleted {
                    owner: action.owner().to_string(),
                    key: outcome.key.to_string(),
                    cache_status: outcome.cache_status,
                });
                self.ctx.tracker()?.complete(id, outcome, state);
            }
            ActionFlow::Failed(err) => {
                debug!("{} failed: {}", action.owner(), err);
                self.ctx.event_channel.send(WorkerEvent::ActionFailed {
                    owner: action.owner().to_string(),
                    error: err.to_string(),
                });
                let mut tracker = self.ctx.tracker()?;
                tracker.fail(id, err);
                if !self.ctx.options.keep_going {
                    tracker.cancel_pending();
                }
            }
        }

        Ok(())
    }

    async fn handle_action(&self, id: ActionId) -> Result<ActionFlow, WorkerError> {
        let graph = self.ctx.graph.clone();
        let action = graph.action(id);
        let started = Instant::now();

        let inputs = match self.input_fingerprints(id).await? {
            Ok(inputs) => inputs,
            Err(err) => return Ok(ActionFlow::Failed(err)),
        };
        let key = match ActionKey::compute(&graph, id, &inputs) {
            Ok(key) => key,
            Err(err) => return Ok(ActionFlow::Failed(ExecutionError::from(err).into())),
        };

        // Actions that only group other artifacts have nothing to run.
        if is_middleman_action(&graph, id) {
            return Ok(ActionFlow::Completed {
                outcome: ActionOutcome {
                    outputs: self.middleman_outputs(id, &key),
                    key,
                    exit_code: 0,
                    strategy: None,
                    cache_status: CacheStatus::Fresh,
                    wall_time: started.elapsed(),
                },
                state: ActionState::Succeeded,
            });
        }

        let _guard = if self.ctx.options.use_cache {
            Some(self.ctx.inflight.acquire(&key).await)
        } else {
            None
        };

        if self.ctx.options.use_cache {
            if let Some(outcome) = self.try_cache(id, &key, started).await {
                return Ok(ActionFlow::Completed {
                    outcome,
                    state: ActionState::Cached,
                });
            }
        }

        let strategy = match self.ctx.strategies.resolve(action).await {
            Ok(strategy) => strategy,
            Err(err) => return Ok(ActionFlow::Failed(err.into())),
        };

        let spawn = self.spawn(id, key.clone());
        self.ctx.event_channel.send(WorkerEvent::ActionStarted {
            owner: action.owner().to_string(),
            mnemonic: action.mnemonic().to_string(),
            strategy: strategy.name().to_string(),
        });

        let execution = AssertUnwindSafe(strategy.execute(&spawn, &self.ctx.exec_ctx));
        let result = match execution.catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => return Ok(ActionFlow::Failed(err.into())),
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!("{} panicked in {}: {}", action.owner(), strategy.name(), reason);
                return Ok(ActionFlow::Failed(ExecutionError::Panicked { reason }.into()));
            }
        };

        let outputs = match self.match_outputs(id, &key, &result) {
            Ok(outputs) => outputs,
            Err(err) => return Ok(ActionFlow::Failed(err.into())),
        };

        if self.ctx.options.use_cache {
            self.store(id, &key, &outputs, result.exit_code).await;
        }

        Ok(ActionFlow::Completed {
            outcome: ActionOutcome {
                key,
                exit_code: result.exit_code,
                outputs,
                strategy: Some(strategy.name().to_string()),
                cache_status: CacheStatus::Fresh,
                wall_time: started.elapsed(),
            },
            state: ActionState::Succeeded,
        })
    }

    /// The fingerprint of every input, in declaration order. Produced inputs were recorded when
    /// their producer completed; sources are hashed the first time anything consumes them.
    async fn input_fingerprints(
        &self,
        id: ActionId,
    ) -> Result<Result<Vec<Fingerprint>, ActionError>, WorkerError> {
        let graph = &self.ctx.graph;
        let mut fingerprints = vec![];
        for input in graph.dependencies(id) {
            let known = self.ctx.tracker()?.artifact_fingerprint(*input).cloned();
            if let Some(fingerprint) = known {
                fingerprints.push(fingerprint);
                continue;
            }

            let artifact = graph.artifact(*input);
            let path = artifact.resolve(
                &self.ctx.exec_ctx.workspace_root,
                &self.ctx.exec_ctx.output_root,
            );
            // Produced inputs always have a fingerprint once their producer completed, so this
            // is almost always a source.
            let fingerprint = match artifact.kind() {
                ArtifactKind::Middleman => Ok(Fingerprint::of_bytes(
                    artifact.path().to_string_lossy().as_bytes(),
                )),
                kind => Fingerprint::of_path(&path, kind).await,
            };

            match fingerprint {
                Ok(fingerprint) => {
                    if artifact.is_source() {
                        self.ctx
                            .tracker()?
                            .record_source(*input, fingerprint.clone());
                    }
                    fingerprints.push(fingerprint);
                }
                Err(err) => return Ok(Err(ActionError::InputFingerprint { path, err })),
            }
        }
        Ok(Ok(fingerprints))
    }

    fn middleman_outputs(&self, id: ActionId, key: &ActionKey) -> Vec<(ArtifactId, Fingerprint)> {
        self.ctx
            .graph
            .outputs(id)
            .iter()
            .filter(|out| self.ctx.graph.artifact(**out).is_middleman())
            .map(|out| (*out, Fingerprint::from(key.clone())))
            .collect()
    }

    #[tracing::instrument(name = "LocalWorker::try_cache", skip(self, started))]
    async fn try_cache(
        &self,
        id: ActionId,
        key: &ActionKey,
        started: Instant,
    ) -> Option<ActionOutcome> {
        let graph = &self.ctx.graph;
        let miss = || -> Option<ActionOutcome> {
            self.ctx.event_channel.send(CacheEvent::CacheMiss {
                key: key.to_string(),
            });
            None
        };

        let entry = match self.ctx.cache.lookup(key).await {
            Some(entry) => entry,
            None => return miss(),
        };

        let mut outputs = self.middleman_outputs(id, key);
        for out in graph.outputs(id) {
            let artifact = graph.artifact(*out);
            if artifact.is_middleman() {
                continue;
            }
            let cached = entry
                .outputs
                .iter()
                .find(|cached| cached.path == artifact.path() && cached.kind == artifact.kind());
            match cached {
                Some(cached) => outputs.push((*out, cached.fingerprint.clone())),
                None => return miss(),
            }
        }

        match self
            .ctx
            .cache
            .restore(&entry, &self.ctx.exec_ctx.output_root)
            .await
        {
            Ok(true) => (),
            Ok(false) => return miss(),
            Err(err) => {
                warn!("Could not restore cached outputs of {}: {}", entry.owner, err);
                return miss();
            }
        }

        self.ctx.event_channel.send(CacheEvent::CacheHit {
            key: key.to_string(),
        });

        Some(ActionOutcome {
            key: key.clone(),
            exit_code: entry.exit_code,
            outputs,
            strategy: None,
            cache_status: CacheStatus::Cached,
            wall_time: started.elapsed(),
        })
    }

    async fn store(
        &self,
        id: ActionId,
        key: &ActionKey,
        outputs: &[(ArtifactId, Fingerprint)],
        exit_code: i32,
    ) {
        let graph = &self.ctx.graph;
        let cached = outputs
            .iter()
            .map(|(artifact, fingerprint)| {
                let artifact = graph.artifact(*artifact);
                CachedOutput {
                    path: artifact.path().to_path_buf(),
                    kind: artifact.kind(),
                    fingerprint: fingerprint.clone(),
                }
            })
            .collect();
        let entry = CacheEntry::new(
            key.clone(),
            graph.action(id).owner().to_string(),
            cached,
            exit_code,
        );

        if let Err(err) = self
            .ctx
            .cache
            .store(&entry, &self.ctx.exec_ctx.output_root)
            .await
        {
            warn!("Could not cache results of {}: {}", entry.owner, err);
        }
    }

    fn spawn(&self, id: ActionId, key: ActionKey) -> Spawn {
        let graph = &self.ctx.graph;
        let action = graph.action(id);
        let exec_ctx = &self.ctx.exec_ctx;

        let inputs = action
            .inputs()
            .iter()
            .map(|input| {
                let artifact = graph.artifact(*input);
                SpawnInput {
                    path: artifact.path().to_path_buf(),
                    location: artifact.resolve(&exec_ctx.workspace_root, &exec_ctx.output_root),
                    kind: artifact.kind(),
                }
            })
            .collect();

        let outputs = action
            .outputs()
            .iter()
            .map(|out| graph.artifact(*out))
            .filter(|artifact| !artifact.is_middleman())
            .map(|artifact| SpawnOutput {
                path: artifact.path().to_path_buf(),
                kind: artifact.kind(),
            })
            .collect();

        Spawn {
            owner: action.owner().to_string(),
            mnemonic: action.mnemonic().to_string(),
            key,
            command: action.command().clone(),
            inputs,
            outputs,
            resources: *action.resources(),
            timeout: action.timeout().or(self.ctx.options.default_timeout),
        }
    }

    /// Pair the outputs a strategy reported with the artifacts of the action.
    fn match_outputs(
        &self,
        id: ActionId,
        key: &ActionKey,
        result: &ExecutionResult,
    ) -> Result<Vec<(ArtifactId, Fingerprint)>, ExecutionError> {
        let graph = &self.ctx.graph;
        let mut outputs = self.middleman_outputs(id, key);
        let mut missing = vec![];
        for out in graph.outputs(id) {
            let artifact = graph.artifact(*out);
            if artifact.is_middleman() {
                continue;
            }
            match result.outputs.iter().find(|(path, _)| path == artifact.path()) {
                Some((_, fingerprint)) => outputs.push((*out, fingerprint.clone())),
                None => missing.push(artifact.path().to_path_buf()),
            }
        }
        if !missing.is_empty() {
            return Err(ExecutionError::MissingOutputs { missing });
        }
        Ok(outputs)
    }
}

/// An action is a middleman action when everything it outputs is a middleman.
fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn is_middleman_action(graph: &ActionGraph, id: ActionId) -> bool {
    let outputs = graph.outputs(id);
    !outputs.is_empty()
        && outputs
            .iter()
            .all(|out| graph.artifact(*out).is_middleman())
}
