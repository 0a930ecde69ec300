use super::*;
use crate::util::from_file::read_json;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The serialized form of an action graph, as handed over by a build frontend.
///
/// Actions refer to artifacts by their position in `artifacts`.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    #[serde(default)]
    pub actions: Vec<ActionDescription>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionDescription {
    pub owner: String,

    #[serde(default)]
    pub mnemonic: Option<String>,

    #[serde(default)]
    pub inputs: Vec<usize>,

    #[serde(default)]
    pub outputs: Vec<usize>,

    pub executable: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub resources: ResourceHints,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub strategy: Option<String>,
}

impl ActionGraph {
    pub fn from_description(desc: GraphDescription) -> Result<ActionGraph, GraphError> {
        let mut builder = ActionGraph::builder();
        let handles: Vec<ArtifactId> = desc
            .artifacts
            .into_iter()
            .map(|artifact| builder.add_artifact(artifact))
            .collect();

        // Out of range indices become handles that were never registered, so the builder reports
        // them like any other unknown artifact.
        let handle = |idx: usize| {
            handles
                .get(idx)
                .copied()
                .unwrap_or(ArtifactId(u32::try_from(idx).unwrap_or(u32::MAX)))
        };

        for action in desc.actions {
            let mut declared = Action::builder();
            declared
                .owner(action.owner)
                .inputs(action.inputs.into_iter().map(handle).collect())
                .outputs(action.outputs.into_iter().map(handle).collect())
                .command(CommandSpec {
                    executable: action.executable,
                    args: action.args,
                    env: action.env,
                })
                .resources(action.resources);

            if let Some(mnemonic) = action.mnemonic {
                declared.mnemonic(mnemonic);
            }
            if let Some(ms) = action.timeout_ms {
                declared.timeout(Duration::from_millis(ms));
            }
            if let Some(strategy) = action.strategy {
                declared.strategy(strategy);
            }

            // NOTE: every required field is set above.
            let action = declared.build().map_err(|err| GraphError::InvalidAction {
                reason: err.to_string(),
            })?;
            builder.add_action(action);
        }

        builder.build()
    }

    pub fn from_json(json: &str) -> Result<ActionGraph, GraphError> {
        let desc: GraphDescription =
            serde_json::from_str(json).map_err(GraphError::CouldNotParseDescription)?;
        Self::from_description(desc)
    }

    #[tracing::instrument(name = "ActionGraph::from_file")]
    pub async fn from_file(path: &Path) -> Result<ActionGraph, GraphError> {
        let desc: GraphDescription = read_json(path).await?;
        Self::from_description(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const DESCRIPTION: &str = r#"
    {
      "artifacts": [
        { "path": "hello.txt", "root": "source", "kind": "file" },
        { "path": "hello.upper", "root": "output", "kind": "file" },
        { "path": "all", "root": "output", "kind": "middleman" }
      ],
      "actions": [
        {
          "owner": "//:upper",
          "mnemonic": "Upper",
          "inputs": [0],
          "outputs": [1],
          "executable": "/bin/sh",
          "args": ["-c", "tr a-z A-Z < hello.txt > hello.upper"],
          "env": { "PATH": "/usr/bin:/bin" },
          "timeout_ms": 5000
        },
        {
          "owner": "//:all",
          "inputs": [1],
          "outputs": [2],
          "executable": "/bin/true"
        }
      ]
    }
    "#;

    #[test]
    fn parses_a_description() {
        let graph = ActionGraph::from_json(DESCRIPTION).unwrap();
        assert_eq!(graph.len(), 2);

        let upper = graph.find_action("//:upper").unwrap();
        let action = graph.action(upper);
        assert_eq!(action.mnemonic(), "Upper");
        assert_eq!(action.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            action.command().env.get("PATH").map(String::as_str),
            Some("/usr/bin:/bin")
        );

        let all = graph.find_action("//:all").unwrap();
        assert_eq!(graph.prerequisites(all), &[upper]);
        assert_eq!(graph.action(all).mnemonic(), "Action");
    }

    #[test]
    fn out_of_range_indices_are_unknown_artifacts() {
        let json = r#"
        {
          "artifacts": [],
          "actions": [{ "owner": "//:a", "outputs": [3], "executable": "/bin/true" }]
        }
        "#;
        assert_matches!(
            ActionGraph::from_json(json),
            Err(GraphError::UnknownArtifact { .. })
        );
    }

    #[test]
    fn huge_indices_do_not_wrap_around() {
        let json = r#"
        {
          "artifacts": [{ "path": "out.txt", "root": "output", "kind": "file" }],
          "actions": [{ "owner": "//:a", "outputs": [4294967296], "executable": "/bin/true" }]
        }
        "#;
        assert_matches!(
            ActionGraph::from_json(json),
            Err(GraphError::UnknownArtifact { .. })
        );
    }

    #[test]
    fn dotted_paths_name_the_same_artifact() {
        let json = r#"
        {
          "artifacts": [
            { "path": "./out.txt", "root": "output", "kind": "file" },
            { "path": "out.txt", "root": "output", "kind": "file" }
          ],
          "actions": [
            { "owner": "//:a", "outputs": [0], "executable": "/bin/true" },
            { "owner": "//:b", "outputs": [1], "executable": "/bin/true" }
          ]
        }
        "#;
        assert_matches!(
            ActionGraph::from_json(json),
            Err(GraphError::DuplicateOutput { .. })
        );
    }

    #[test]
    fn malformed_descriptions_are_rejected() {
        assert_matches!(
            ActionGraph::from_json("{ \"actions\": 1 }"),
            Err(GraphError::CouldNotParseDescription(_))
        );
    }

    #[tokio::test]
    async fn reads_descriptions_from_disk() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let file = tmp.child("graph.json");
        file.write_str(DESCRIPTION).unwrap();

        let graph = ActionGraph::from_file(file.path()).await.unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[tokio::test]
    async fn missing_files_are_reported() {
        let tmp = assert_fs::TempDir::new().unwrap();
        assert_matches!(
            ActionGraph::from_file(&tmp.path().join("nope.json")).await,
            Err(GraphError::CouldNotReadDescription(_))
        );
    }
}
