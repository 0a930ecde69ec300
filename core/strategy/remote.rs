use super::*;
use crate::sync::Arc;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tokio::fs;
use tracing::*;

/// What a remote executor hands back for one `Spawn`.
///
/// Output files are keyed by their path relative to the working directory. Files inside a tree
/// output are keyed by their full path, below the tree's own path.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteOutcome {
    pub exit_code: i32,
    pub outputs: BTreeMap<PathBuf, Vec<u8>>,
    pub stderr: String,
}

/// The connection to a remote executor. Kiln ships none, embedders plug their own.
///
#[async_trait]
pub trait RemoteTransport: Send + Sync + std::fmt::Debug {
    /// Check that the remote executor can currently take work.
    async fn probe(&self) -> Result<(), RemoteError>;

    async fn execute(&self, spawn: &Spawn) -> Result<RemoteOutcome, RemoteError>;
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No remote transport has been configured")]
    NotConfigured,

    #[error("Remote executor is unreachable: {0}")]
    Unreachable(String),

    #[error("Remote execution failed: {0}")]
    Transport(String),

    #[error("Could not write remote output to {path:?} due to {err:?}")]
    CouldNotWriteOutput { path: PathBuf, err: std::io::Error },
}

/// Hands actions over to a `RemoteTransport`, then writes the outputs it returns into the output
/// tree.
///
#[derive(Debug, Default)]
pub struct RemoteStrategy {
    transport: Option<Arc<dyn RemoteTransport>>,
}

impl RemoteStrategy {
    pub const NAME: &'static str = "remote";

    pub fn new(transport: Option<Arc<dyn RemoteTransport>>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ExecutionStrategy for RemoteStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn is_available(&self) -> bool {
        match &self.transport {
            None => false,
            Some(transport) => match transport.probe().await {
                Ok(()) => true,
                Err(err) => {
                    debug!("Remote transport is unavailable: {}", err);
                    false
                }
            },
        }
    }

    #[tracing::instrument(name = "RemoteStrategy::execute", skip(self, spawn, ctx), fields(kiln.owner = %spawn.owner))]
    async fn execute(
        &self,
        spawn: &Spawn,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let transport = self.transport.as_ref().ok_or(RemoteError::NotConfigured)?;
        let started = Instant::now();

        let outcome = tokio::select! {
            outcome = transport.execute(spawn) => outcome?,
            _ = ctx.abort.cancelled() => return Err(ExecutionError::Aborted),
        };

        if outcome.exit_code != 0 {
            return Err(ExecutionError::NonZeroExit {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }

        let mut files: Vec<Vec<(&Path, &[u8])>> = vec![];
        let mut expected_but_missing = vec![];
        for out in &spawn.outputs {
            let found: Vec<(&Path, &[u8])> = match out.kind {
                ArtifactKind::Tree => outcome
                    .outputs
                    .iter()
                    .filter(|(path, _)| path.starts_with(&out.path) && *path != &out.path)
                    .map(|(path, bytes)| (path.as_path(), bytes.as_slice()))
                    .collect(),
                _ => outcome
                    .outputs
                    .get_key_value(&out.path)
                    .map(|(path, bytes)| (path.as_path(), bytes.as_slice()))
                    .into_iter()
                    .collect(),
            };
            if found.is_empty() {
                expected_but_missing.push(out.path.clone());
            }
            files.push(found);
        }

        if !expected_but_missing.is_empty() {
            return Err(ExecutionError::MissingOutputs {
                missing: expected_but_missing,
            });
        }

        let mut outputs = vec![];
        for (out, found) in spawn.outputs.iter().zip(files) {
            let dst = ctx.output_root.join(&out.path);
            let fingerprint = match out.kind {
                ArtifactKind::Tree => {
                    crate::util::fs::remove_path(&dst)
                        .await
                        .map_err(|err| RemoteError::CouldNotWriteOutput {
                            path: dst.clone(),
                            err,
                        })?;
                    for (path, bytes) in found {
                        write_atomically(&ctx.output_root.join(path), bytes).await?;
                    }
                    Fingerprint::of_tree(&dst).await?
                }
                _ => {
                    let (_, bytes) = found[0];
                    write_atomically(&dst, bytes).await?;
                    Fingerprint::of_bytes(bytes)
                }
            };
            outputs.push((out.path.clone(), fingerprint));
        }

        Ok(ExecutionResult {
            exit_code: outcome.exit_code,
            outputs,
            wall_time: started.elapsed(),
        })
    }
}

/// Write to a temporary sibling of `dst` and rename it into place, so readers of `dst` never see
/// a partial file.
async fn write_atomically(dst: &Path, bytes: &[u8]) -> Result<(), RemoteError> {
    let write = async {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        let name = dst
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = dst.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, dst).await
    };
    write
        .await
        .map_err(|err| RemoteError::CouldNotWriteOutput {
            path: dst.to_path_buf(),
            err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventChannel;
    use crate::graph::{CommandSpec, ResourceHints};
    use assert_fs::prelude::*;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct FakeTransport {
        reachable: bool,
        outcome: RemoteOutcome,
    }

    #[async_trait]
    impl RemoteTransport for FakeTransport {
        async fn probe(&self) -> Result<(), RemoteError> {
            if self.reachable {
                Ok(())
            } else {
                Err(RemoteError::Unreachable("offline".to_string()))
            }
        }

        async fn execute(&self, _spawn: &Spawn) -> Result<RemoteOutcome, RemoteError> {
            Ok(self.outcome.clone())
        }
    }

    fn ctx(tmp: &assert_fs::TempDir) -> ExecutionContext {
        ExecutionContext {
            workspace_root: tmp.path().to_path_buf(),
            output_root: tmp.path().join("out"),
            exec_root: tmp.path().join("execroot"),
            log_root: tmp.path().join("logs"),
            host_env: Arc::new(HashMap::new()),
            event_channel: Arc::new(EventChannel::new()),
            abort: CancellationToken::new(),
        }
    }

    fn spawn(outputs: Vec<SpawnOutput>) -> Spawn {
        Spawn {
            owner: "//:remote".to_string(),
            mnemonic: "Test".to_string(),
            key: crate::fingerprint::ActionKey::from_hex("ab"),
            command: CommandSpec::shell("true"),
            inputs: vec![],
            outputs,
            resources: ResourceHints::default(),
            timeout: None,
        }
    }

    fn strategy(reachable: bool, outcome: RemoteOutcome) -> RemoteStrategy {
        RemoteStrategy::new(Some(Arc::new(FakeTransport { reachable, outcome })))
    }

    #[tokio::test]
    async fn is_unavailable_without_a_transport() {
        assert!(!RemoteStrategy::default().is_available().await);
        assert!(!strategy(false, RemoteOutcome::default()).is_available().await);
        assert!(strategy(true, RemoteOutcome::default()).is_available().await);
    }

    #[tokio::test]
    async fn writes_returned_outputs() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let outcome = RemoteOutcome {
            exit_code: 0,
            outputs: BTreeMap::from([
                (PathBuf::from("a.txt"), b"a".to_vec()),
                (PathBuf::from("gen/x.txt"), b"x".to_vec()),
            ]),
            stderr: String::new(),
        };
        let result = strategy(true, outcome)
            .execute(
                &spawn(vec![
                    SpawnOutput {
                        path: "a.txt".into(),
                        kind: ArtifactKind::File,
                    },
                    SpawnOutput {
                        path: "gen".into(),
                        kind: ArtifactKind::Tree,
                    },
                ]),
                &ctx(&tmp),
            )
            .await
            .unwrap();

        tmp.child("out/a.txt").assert("a");
        tmp.child("out/gen/x.txt").assert("x");
        assert_eq!(
            result.outputs[0],
            (PathBuf::from("a.txt"), Fingerprint::of_bytes(b"a"))
        );
    }

    #[tokio::test]
    async fn missing_remote_outputs_are_reported() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let result = strategy(true, RemoteOutcome::default())
            .execute(
                &spawn(vec![SpawnOutput {
                    path: "a.txt".into(),
                    kind: ArtifactKind::File,
                }]),
                &ctx(&tmp),
            )
            .await;
        assert_matches!(result, Err(ExecutionError::MissingOutputs { .. }));
    }

    #[tokio::test]
    async fn remote_failures_keep_their_exit_code() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let outcome = RemoteOutcome {
            exit_code: 2,
            stderr: "nope".to_string(),
            ..Default::default()
        };
        assert_matches!(
            strategy(true, outcome).execute(&spawn(vec![]), &ctx(&tmp)).await,
            Err(ExecutionError::NonZeroExit { exit_code: 2, .. })
        );
    }
}
