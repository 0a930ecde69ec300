//! # Fingerprints
//!
//! Content digests for artifacts and the cache keys derived from them.
//!
use crate::graph::{ActionGraph, ActionId, ArtifactKind};
use crate::util::fs::scan_files;
use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the layout of an `ActionKey` changes, so old cache entries stop matching.
const ACTION_KEY_VERSION: &str = "kiln-action-key/1";

/// A lowercase hex SHA-256 digest of some content.
///
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut s = Sha256::new();
        s.update(bytes);
        Self(format!("{:x}", s.finalize()))
    }

    #[tracing::instrument(name = "Fingerprint::of_file")]
    pub async fn of_file(path: &Path) -> Result<Self, FingerprintError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let f = std::fs::File::open(&path).map_err(|err| FingerprintError::CouldNotRead {
                file: path.clone(),
                err,
            })?;
            let mut s = Sha256::new();
            let mut buffer = [0; 8192];
            let mut reader = std::io::BufReader::new(f);
            loop {
                let len = reader
                    .read(&mut buffer)
                    .map_err(|err| FingerprintError::CouldNotRead {
                        file: path.clone(),
                        err,
                    })?;
                if len == 0 {
                    break;
                }
                s.update(&buffer[..len]);
            }
            Ok(Self(format!("{:x}", s.finalize())))
        })
        .await
        .map_err(|err| FingerprintError::HashingTaskFailed(err.to_string()))?
    }

    /// Hash every file below `root` together with its path relative to `root`, in sorted order.
    #[tracing::instrument(name = "Fingerprint::of_tree")]
    pub async fn of_tree(root: &Path) -> Result<Self, FingerprintError> {
        let files = scan_files(root)
            .await
            .map_err(|err| FingerprintError::CouldNotRead {
                file: root.to_path_buf(),
                err,
            })?;

        let mut s = Sha256::new();
        for file in files {
            let rel = file.strip_prefix(root).unwrap_or(&file);
            let content = Self::of_file(&file).await?;
            write_field(&mut s, rel.to_string_lossy().as_bytes());
            write_field(&mut s, content.as_str().as_bytes());
        }
        Ok(Self(format!("{:x}", s.finalize())))
    }

    /// Fingerprint whatever is at `path`, the way an artifact of `kind` is fingerprinted.
    /// Middlemen have no content, so they are handled by the caller.
    pub async fn of_path(path: &Path, kind: ArtifactKind) -> Result<Self, FingerprintError> {
        match kind {
            ArtifactKind::Tree => Self::of_tree(path).await,
            _ => Self::of_file(path).await,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ActionKey> for Fingerprint {
    fn from(key: ActionKey) -> Self {
        Self(key.0)
    }
}

/// The cache key of an action: a digest of its command and the content of its inputs.
///
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
    /// Compute the key of `action`, given the fingerprints of its inputs in declaration order.
    ///
    /// Every field is length-prefixed, so that moving bytes from one field into the next can
    /// never produce the same key.
    ///
    pub fn compute(
        graph: &ActionGraph,
        action: ActionId,
        inputs: &[Fingerprint],
    ) -> Result<Self, FingerprintError> {
        let declared = graph.action(action);
        if declared.inputs().len() != inputs.len() {
            return Err(FingerprintError::InputCountMismatch {
                expected: declared.inputs().len(),
                found: inputs.len(),
            });
        }

        let mut s = Sha256::new();
        write_field(&mut s, ACTION_KEY_VERSION.as_bytes());

        let cmd = declared.command();
        write_field(&mut s, cmd.executable().to_string_lossy().as_bytes());
        write_len(&mut s, cmd.args.len());
        for arg in &cmd.args {
            write_field(&mut s, arg.as_bytes());
        }

        // BTreeMap iterates in name order already.
        write_len(&mut s, cmd.env.len());
        for (name, value) in &cmd.env {
            write_field(&mut s, name.as_bytes());
            write_field(&mut s, value.as_bytes());
        }

        write_len(&mut s, inputs.len());
        for (artifact, fingerprint) in declared.inputs().iter().zip(inputs) {
            let artifact = graph.artifact(*artifact);
            write_field(&mut s, format!("{:?}", artifact.root()).as_bytes());
            write_field(&mut s, artifact.path().to_string_lossy().as_bytes());
            write_field(&mut s, fingerprint.as_str().as_bytes());
        }

        write_len(&mut s, declared.outputs().len());
        for artifact in declared.outputs() {
            let artifact = graph.artifact(*artifact);
            write_field(&mut s, artifact.path().to_string_lossy().as_bytes());
            write_field(&mut s, format!("{:?}", artifact.kind()).as_bytes());
        }

        Ok(Self(format!("{:x}", s.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn write_len(s: &mut Sha256, len: usize) {
    s.update((len as u64).to_le_bytes());
}

fn write_field(s: &mut Sha256, bytes: &[u8]) {
    write_len(s, bytes.len());
    s.update(bytes);
}

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Could not read {file:?} to fingerprint it due to {err:?}")]
    CouldNotRead { file: PathBuf, err: std::io::Error },

    #[error("Expected {expected} input fingerprints but found {found}")]
    InputCountMismatch { expected: usize, found: usize },

    #[error("Hashing task failed: {0}")]
    HashingTaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Action, CommandSpec};
    use assert_fs::prelude::*;

    fn graph_with(cmd: CommandSpec) -> (ActionGraph, ActionId) {
        let mut g = ActionGraph::builder();
        let src = g.source("in.txt");
        let out = g.output("out.txt");
        let id = g.add_action(
            Action::builder()
                .owner("//:a")
                .inputs(vec![src])
                .outputs(vec![out])
                .command(cmd)
                .build()
                .unwrap(),
        );
        (g.build().unwrap(), id)
    }

    #[test]
    fn hashes_bytes_as_lowercase_hex() {
        assert_eq!(
            Fingerprint::of_bytes(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn files_hash_like_their_bytes() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let file = tmp.child("a.txt");
        file.write_str("hello").unwrap();
        assert_eq!(
            Fingerprint::of_file(file.path()).await.unwrap(),
            Fingerprint::of_bytes(b"hello")
        );
    }

    #[tokio::test]
    async fn missing_files_cannot_be_fingerprinted() {
        let tmp = assert_fs::TempDir::new().unwrap();
        assert_matches!(
            Fingerprint::of_file(&tmp.path().join("nope")).await,
            Err(FingerprintError::CouldNotRead { .. })
        );
    }

    #[tokio::test]
    async fn trees_depend_on_names_and_contents() {
        let tmp = assert_fs::TempDir::new().unwrap();
        tmp.child("one/a.txt").write_str("a").unwrap();
        tmp.child("two/b.txt").write_str("a").unwrap();
        tmp.child("three/a.txt").write_str("a").unwrap();

        let one = Fingerprint::of_tree(&tmp.path().join("one")).await.unwrap();
        let two = Fingerprint::of_tree(&tmp.path().join("two")).await.unwrap();
        let three = Fingerprint::of_tree(&tmp.path().join("three"))
            .await
            .unwrap();
        assert_ne!(one, two);
        assert_eq!(one, three);
    }

    #[test]
    fn keys_are_stable() {
        let (graph, id) = graph_with(CommandSpec::shell("cp in.txt out.txt"));
        let inputs = vec![Fingerprint::of_bytes(b"hello")];
        assert_eq!(
            ActionKey::compute(&graph, id, &inputs).unwrap(),
            ActionKey::compute(&graph, id, &inputs).unwrap()
        );
    }

    #[test]
    fn keys_change_with_inputs_and_commands() {
        let (graph, id) = graph_with(CommandSpec::shell("cp in.txt out.txt"));
        let a = ActionKey::compute(&graph, id, &[Fingerprint::of_bytes(b"a")]).unwrap();
        let b = ActionKey::compute(&graph, id, &[Fingerprint::of_bytes(b"b")]).unwrap();
        assert_ne!(a, b);

        let (graph, id) = graph_with(CommandSpec::shell("cp in.txt out.txt").env("LANG", "C"));
        let c = ActionKey::compute(&graph, id, &[Fingerprint::of_bytes(b"a")]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn shifting_bytes_between_arguments_changes_the_key() {
        let (graph, a_id) = graph_with(CommandSpec::new("/bin/echo").arg("ab").arg("c"));
        let (other, b_id) = graph_with(CommandSpec::new("/bin/echo").arg("a").arg("bc"));
        let inputs = vec![Fingerprint::of_bytes(b"x")];
        assert_ne!(
            ActionKey::compute(&graph, a_id, &inputs).unwrap(),
            ActionKey::compute(&other, b_id, &inputs).unwrap()
        );
    }

    #[test]
    fn keys_need_every_input_fingerprint() {
        let (graph, id) = graph_with(CommandSpec::shell("true"));
        assert_matches!(
            ActionKey::compute(&graph, id, &[]),
            Err(FingerprintError::InputCountMismatch { .. })
        );
    }

    #[quickcheck]
    fn different_argument_lists_give_different_keys(a: Vec<String>, b: Vec<String>) -> bool {
        let (ga, ia) = graph_with(CommandSpec {
            executable: "/bin/echo".into(),
            args: a.clone(),
            ..Default::default()
        });
        let (gb, ib) = graph_with(CommandSpec {
            executable: "/bin/echo".into(),
            args: b.clone(),
            ..Default::default()
        });
        let inputs = vec![Fingerprint::of_bytes(b"x")];
        let same = ActionKey::compute(&ga, ia, &inputs).unwrap()
            == ActionKey::compute(&gb, ib, &inputs).unwrap();
        same == (a == b)
    }
}
