//! # Action Graph Model
//!
//! An immutable, flat, index-addressed table of `Action`s and `Artifact`s. Edges are expressed
//! through `ArtifactId` and `ActionId` handles rather than references, so the graph is plain
//! data that can be shared across workers behind an `Arc` without any locking.
//!

mod action;
mod artifact;
mod builder;
mod description;
mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use action::*;
pub use artifact::*;
pub use builder::*;
pub use description::*;
pub use error::*;

use fxhash::FxHashSet;

/// How urgently an action should run once it is ready. Larger is more urgent.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority {
    /// Length of the longest chain of actions waiting on this one.
    pub critical_path: u32,

    /// Number of actions directly consuming an output of this one.
    pub dependents: u32,
}

#[derive(Debug)]
pub struct ActionGraph {
    artifacts: Vec<Artifact>,
    actions: Vec<Action>,

    /// For every artifact, the action that outputs it, if any.
    producers: Vec<Option<ActionId>>,

    /// For every action, the distinct actions that consume any of its outputs.
    dependents: Vec<Vec<ActionId>>,

    /// For every action, the distinct actions producing any of its inputs.
    prerequisites: Vec<Vec<ActionId>>,

    priorities: Vec<Priority>,
}

impl ActionGraph {
    pub fn builder() -> ActionGraphBuilder {
        ActionGraphBuilder::new()
    }

    /// The number of actions in this graph.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.index()]
    }

    pub fn artifact(&self, id: ArtifactId) -> &Artifact {
        &self.artifacts[id.index()]
    }

    pub fn action_ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        (0..self.actions.len() as u32).map(ActionId)
    }

    pub fn artifact_ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        (0..self.artifacts.len() as u32).map(ArtifactId)
    }

    /// The single action that outputs `artifact`, or `None` for source artifacts.
    pub fn producing_action(&self, artifact: ArtifactId) -> Option<ActionId> {
        self.producers[artifact.index()]
    }

    /// The artifacts `action` consumes.
    pub fn dependencies(&self, action: ActionId) -> &[ArtifactId] {
        self.action(action).inputs()
    }

    pub fn outputs(&self, action: ActionId) -> &[ArtifactId] {
        self.action(action).outputs()
    }

    /// The actions that consume at least one output of `action`.
    pub fn dependents(&self, action: ActionId) -> &[ActionId] {
        &self.dependents[action.index()]
    }

    /// The actions that produce at least one input of `action`.
    pub fn prerequisites(&self, action: ActionId) -> &[ActionId] {
        &self.prerequisites[action.index()]
    }

    /// Every action that, directly or not, consumes an output of `action`.
    pub fn transitive_dependents(&self, action: ActionId) -> FxHashSet<ActionId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<ActionId> = self.dependents(action).to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend_from_slice(self.dependents(next));
            }
        }
        seen
    }

    pub fn priority(&self, action: ActionId) -> Priority {
        self.priorities[action.index()]
    }

    /// Find an artifact handle by its root and path.
    pub fn find_artifact(&self, root: Root, path: &std::path::Path) -> Option<ArtifactId> {
        self.artifact_ids().find(|id| {
            let artifact = self.artifact(*id);
            artifact.root() == root && artifact.path() == path
        })
    }

    /// Find the first action declared by `owner`.
    pub fn find_action(&self, owner: &str) -> Option<ActionId> {
        self.action_ids().find(|id| self.action(*id).owner() == owner)
    }
}
