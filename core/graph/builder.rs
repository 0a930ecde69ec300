use super::*;
use daggy::{Dag, NodeIndex};
use fxhash::FxHashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::*;

/// Accumulates artifacts and actions, then validates them into an immutable `ActionGraph`.
///
/// Registering the same `(root, path)` twice hands back the same `ArtifactId`. Problems found
/// while registering are kept and reported by `build`, which is the single point where a graph
/// is accepted or rejected.
///
#[derive(Debug, Default)]
pub struct ActionGraphBuilder {
    artifacts: Vec<Artifact>,
    index: FxHashMap<(Root, PathBuf), ArtifactId>,
    actions: Vec<Action>,
    errors: Vec<GraphError>,
}

impl ActionGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artifact(&mut self, artifact: Artifact) -> ArtifactId {
        let artifact = artifact.normalized();
        if !artifact.has_valid_path() {
            self.errors.push(GraphError::InvalidArtifactPath {
                path: artifact.path().to_path_buf(),
            });
        }

        let key = (artifact.root(), artifact.path().to_path_buf());
        if let Some(id) = self.index.get(&key) {
            let existing = self.artifacts[id.index()].kind();
            if existing != artifact.kind() {
                self.errors.push(GraphError::ConflictingArtifact {
                    path: key.1,
                    existing,
                    requested: artifact.kind(),
                });
            }
            return *id;
        }

        let id = ArtifactId(self.artifacts.len() as u32);
        self.artifacts.push(artifact);
        self.index.insert(key, id);
        id
    }

    pub fn source<P: Into<PathBuf>>(&mut self, path: P) -> ArtifactId {
        self.add_artifact(Artifact::source(path))
    }

    pub fn output<P: Into<PathBuf>>(&mut self, path: P) -> ArtifactId {
        self.add_artifact(Artifact::output(path))
    }

    pub fn tree<P: Into<PathBuf>>(&mut self, path: P) -> ArtifactId {
        self.add_artifact(Artifact::tree(path))
    }

    pub fn middleman<P: Into<PathBuf>>(&mut self, path: P) -> ArtifactId {
        self.add_artifact(Artifact::middleman(path))
    }

    pub fn add_action(&mut self, action: Action) -> ActionId {
        let id = ActionId(self.actions.len() as u32);
        self.actions.push(action);
        id
    }

    #[tracing::instrument(name = "ActionGraphBuilder::build", skip(self))]
    pub fn build(self) -> Result<ActionGraph, GraphError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let artifacts = self.artifacts;
        let actions = self.actions;

        for action in &actions {
            for artifact in action.inputs().iter().chain(action.outputs()) {
                if artifact.index() >= artifacts.len() {
                    return Err(GraphError::UnknownArtifact {
                        owner: action.owner().to_string(),
                        artifact: *artifact,
                    });
                }
            }
        }

        let mut producers: Vec<Option<ActionId>> = vec![None; artifacts.len()];
        for (idx, action) in actions.iter().enumerate() {
            for out in action.outputs() {
                let artifact = &artifacts[out.index()];
                if artifact.is_source() {
                    return Err(GraphError::SourceArtifactAsOutput {
                        owner: action.owner().to_string(),
                        path: artifact.path().to_path_buf(),
                    });
                }
                if let Some(first) = producers[out.index()] {
                    return Err(GraphError::DuplicateOutput {
                        path: artifact.path().to_path_buf(),
                        first: actions[first.index()].owner().to_string(),
                        second: action.owner().to_string(),
                    });
                }
                producers[out.index()] = Some(ActionId(idx as u32));
            }
        }

        let mut prerequisites: Vec<Vec<ActionId>> = vec![vec![]; actions.len()];
        let mut dependents: Vec<Vec<ActionId>> = vec![vec![]; actions.len()];
        for (idx, action) in actions.iter().enumerate() {
            let id = ActionId(idx as u32);
            for input in action.inputs() {
                let artifact = &artifacts[input.index()];
                match producers[input.index()] {
                    Some(producer) => {
                        if !prerequisites[idx].contains(&producer) {
                            prerequisites[idx].push(producer);
                            dependents[producer.index()].push(id);
                        }
                    }
                    None if !artifact.is_source() => {
                        return Err(GraphError::MissingProducer {
                            consumer: action.owner().to_string(),
                            path: artifact.path().to_path_buf(),
                        });
                    }
                    None => (),
                }
            }
        }

        let order = topological_order(&prerequisites, &dependents);
        if order.len() != actions.len() {
            return Err(find_cycle(&actions, &prerequisites));
        }

        let mut priorities = vec![Priority::default(); actions.len()];
        for id in order.iter().rev() {
            let critical_path = dependents[id.index()]
                .iter()
                .map(|d| priorities[d.index()].critical_path + 1)
                .max()
                .unwrap_or(0);
            priorities[id.index()] = Priority {
                critical_path,
                dependents: dependents[id.index()].len() as u32,
            };
        }

        debug!(
            "Built graph with {} actions and {} artifacts",
            actions.len(),
            artifacts.len()
        );

        Ok(ActionGraph {
            artifacts,
            actions,
            producers,
            dependents,
            prerequisites,
            priorities,
        })
    }
}

/// Kahn's algorithm. If the result is shorter than the number of actions, there is a cycle.
fn topological_order(prerequisites: &[Vec<ActionId>], dependents: &[Vec<ActionId>]) -> Vec<ActionId> {
    let mut indegree: Vec<usize> = prerequisites.iter().map(|p| p.len()).collect();
    let mut queue: VecDeque<ActionId> = indegree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(idx, _)| ActionId(idx as u32))
        .collect();

    let mut order = Vec::with_capacity(prerequisites.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for dep in &dependents[id.index()] {
            indegree[dep.index()] -= 1;
            if indegree[dep.index()] == 0 {
                queue.push_back(*dep);
            }
        }
    }
    order
}

/// Replay every edge into a `Dag` to find the first one that closes a cycle, so we can name
/// the action responsible for it.
fn find_cycle(actions: &[Action], prerequisites: &[Vec<ActionId>]) -> GraphError {
    let mut dag: Dag<ActionId, (), u32> = Dag::new();
    let nodes: Vec<NodeIndex> = (0..actions.len())
        .map(|idx| dag.add_node(ActionId(idx as u32)))
        .collect();

    for (idx, prereqs) in prerequisites.iter().enumerate() {
        for prereq in prereqs {
            let closes_cycle = prereq.index() == idx
                || dag.add_edge(nodes[prereq.index()], nodes[idx], ()).is_err();
            if closes_cycle {
                return GraphError::Cycle {
                    owner: actions[idx].owner().to_string(),
                };
            }
        }
    }

    // NOTE: unreachable in practice, Kahn's algorithm only stalls on a cycle.
    GraphError::Cycle {
        owner: actions
            .first()
            .map(|a| a.owner().to_string())
            .unwrap_or_default(),
    }
}
