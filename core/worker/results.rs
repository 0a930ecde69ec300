use super::ActionError;
use crate::fingerprint::{ActionKey, Fingerprint};
use crate::graph::{ActionGraph, ActionId, ArtifactId};
use crate::sync::Arc;
use std::time::Duration;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionState {
    /// Waiting on at least one producer of its inputs.
    #[default]
    Pending,
    Ready,
    Running,
    Succeeded,
    Cached,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Cached | Self::Failed)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheStatus {
    #[default]
    Fresh,
    Cached,
}

/// What a completed action left behind.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub key: ActionKey,
    pub exit_code: i32,
    pub outputs: Vec<(ArtifactId, Fingerprint)>,

    /// The strategy that ran the action, `None` when nothing had to run.
    pub strategy: Option<String>,
    pub cache_status: CacheStatus,
    pub wall_time: Duration,
}

/// The terminal state of every action in a graph after an execution, and what each one produced.
///
#[derive(Clone, Debug)]
pub struct BuildResults {
    pub(crate) graph: Arc<ActionGraph>,
    pub(crate) states: Vec<ActionState>,
    pub(crate) outcomes: Vec<Option<ActionOutcome>>,
    pub(crate) errors: Vec<Option<Arc<ActionError>>>,
    pub(crate) fingerprints: Vec<Option<Fingerprint>>,
}

impl BuildResults {
    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, action: ActionId) -> ActionState {
        self.states[action.index()]
    }

    pub fn states(&self) -> &[ActionState] {
        &self.states
    }

    pub fn outcome(&self, action: ActionId) -> Option<&ActionOutcome> {
        self.outcomes[action.index()].as_ref()
    }

    pub fn error(&self, action: ActionId) -> Option<&ActionError> {
        self.errors[action.index()].as_deref()
    }

    /// Every failed action and why, in action order.
    pub fn failures(&self) -> Vec<(ActionId, &ActionError)> {
        self.graph
            .action_ids()
            .filter_map(|id| self.error(id).map(|err| (id, err)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.states.iter().all(|state| {
            matches!(state, ActionState::Succeeded | ActionState::Cached)
        })
    }

    pub fn cache_hits(&self) -> Vec<ActionId> {
        self.graph
            .action_ids()
            .filter(|id| self.state(*id) == ActionState::Cached)
            .collect()
    }

    /// Actions that were handed to a strategy and ran to completion.
    pub fn executed(&self) -> Vec<ActionId> {
        self.graph
            .action_ids()
            .filter(|id| {
                self.outcome(*id)
                    .map(|outcome| {
                        outcome.cache_status == CacheStatus::Fresh && outcome.strategy.is_some()
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn executed_keys(&self) -> Vec<ActionKey> {
        self.executed()
            .into_iter()
            .filter_map(|id| self.outcome(id).map(|outcome| outcome.key.clone()))
            .collect()
    }

    /// The recorded fingerprint of an artifact, once its producer completed or, for sources, once
    /// something consumed it.
    pub fn artifact_fingerprint(&self, artifact: ArtifactId) -> Option<&Fingerprint> {
        self.fingerprints[artifact.index()].as_ref()
    }
}
