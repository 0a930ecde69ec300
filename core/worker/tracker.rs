use super::{ActionError, ActionOutcome, ActionState, BuildResults};
use crate::fingerprint::Fingerprint;
use crate::graph::{ActionGraph, ActionId, ArtifactId, Priority};
use crate::sync::Arc;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::*;

#[derive(Debug, PartialEq, Eq)]
struct ReadyAction {
    priority: Priority,
    id: Reverse<ActionId>,
}

impl Ord for ReadyAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ReadyAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tracks which actions are ready to run.
///
/// Every action keeps a count of the distinct producers of its inputs that have not yet
/// completed. When that count hits zero the action is Ready and queued, most urgent first. When
/// an action fails, everything downstream of it fails with it without ever running.
///
#[derive(Debug)]
pub struct ReadinessTracker {
    graph: Arc<ActionGraph>,
    states: Vec<ActionState>,
    remaining: Vec<usize>,
    ready: BinaryHeap<ReadyAction>,
    outcomes: Vec<Option<ActionOutcome>>,
    errors: Vec<Option<Arc<ActionError>>>,
    fingerprints: Vec<Option<Fingerprint>>,
    terminal: usize,
}

impl ReadinessTracker {
    pub fn new(graph: Arc<ActionGraph>) -> Self {
        let len = graph.len();
        let remaining: Vec<usize> = graph
            .action_ids()
            .map(|id| graph.prerequisites(id).len())
            .collect();

        let mut tracker = Self {
            states: vec![ActionState::Pending; len],
            outcomes: vec![None; len],
            errors: vec![None; len],
            fingerprints: vec![None; graph.artifact_ids().count()],
            ready: BinaryHeap::new(),
            terminal: 0,
            remaining,
            graph,
        };

        for id in tracker.graph.action_ids().collect::<Vec<ActionId>>() {
            if tracker.remaining[id.index()] == 0 {
                tracker.mark_ready(id);
            }
        }

        tracker
    }

    fn mark_ready(&mut self, id: ActionId) {
        self.states[id.index()] = ActionState::Ready;
        self.ready.push(ReadyAction {
            priority: self.graph.priority(id),
            id: Reverse(id),
        });
    }

    pub fn state(&self, id: ActionId) -> ActionState {
        self.states[id.index()]
    }

    /// Take the most urgent Ready action and mark it as Running.
    pub fn next_ready(&mut self) -> Option<ActionId> {
        while let Some(ReadyAction { id: Reverse(id), .. }) = self.ready.pop() {
            // Actions failed or cancelled while queued are skipped.
            if self.states[id.index()] == ActionState::Ready {
                self.states[id.index()] = ActionState::Running;
                return Some(id);
            }
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.terminal == self.states.len()
    }

    pub fn artifact_fingerprint(&self, artifact: ArtifactId) -> Option<&Fingerprint> {
        self.fingerprints[artifact.index()].as_ref()
    }

    /// Record the fingerprint of a source artifact the first time it is consumed.
    pub fn record_source(&mut self, artifact: ArtifactId, fingerprint: Fingerprint) {
        self.fingerprints[artifact.index()].get_or_insert(fingerprint);
    }

    /// Record a successful (or cached) completion and release the actions waiting on it.
    pub fn complete(&mut self, id: ActionId, outcome: ActionOutcome, state: ActionState) {
        if self.states[id.index()].is_terminal() {
            warn!("{} completed more than once, ignoring", id);
            return;
        }

        for (artifact, fingerprint) in &outcome.outputs {
            self.fingerprints[artifact.index()] = Some(fingerprint.clone());
        }
        self.states[id.index()] = state;
        self.outcomes[id.index()] = Some(outcome);
        self.terminal += 1;

        let graph = self.graph.clone();
        for dependent in graph.dependents(id) {
            let remaining = &mut self.remaining[dependent.index()];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 && self.states[dependent.index()] == ActionState::Pending {
                self.mark_ready(*dependent);
            }
        }
    }

    /// Record a failure. Every transitive dependent that has not finished yet fails too. Returns
    /// the dependents that were failed this way.
    pub fn fail(&mut self, id: ActionId, error: ActionError) -> Vec<ActionId> {
        if self.states[id.index()].is_terminal() {
            return vec![];
        }
        self.set_failed(id, error);

        let owner = self.graph.action(id).owner().to_string();
        let mut skipped: Vec<ActionId> = self
            .graph
            .transitive_dependents(id)
            .into_iter()
            .filter(|dep| !self.states[dep.index()].is_terminal())
            .collect();
        skipped.sort();

        for dep in &skipped {
            self.set_failed(
                *dep,
                ActionError::DependencyFailed {
                    dependency: owner.clone(),
                },
            );
        }
        skipped
    }

    /// Fail every action that has not started yet. Running actions are left alone.
    pub fn cancel_pending(&mut self) -> usize {
        let pending: Vec<ActionId> = self
            .graph
            .action_ids()
            .filter(|id| {
                matches!(
                    self.states[id.index()],
                    ActionState::Pending | ActionState::Ready
                )
            })
            .collect();
        for id in &pending {
            self.set_failed(*id, ActionError::Cancelled);
        }
        pending.len()
    }

    fn set_failed(&mut self, id: ActionId, error: ActionError) {
        self.states[id.index()] = ActionState::Failed;
        self.errors[id.index()] = Some(Arc::new(error));
        self.terminal += 1;
    }

    pub fn results(&self) -> BuildResults {
        BuildResults {
            graph: self.graph.clone(),
            states: self.states.clone(),
            outcomes: self.outcomes.clone(),
            errors: self.errors.clone(),
            fingerprints: self.fingerprints.clone(),
        }
    }
}
