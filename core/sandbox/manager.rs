use super::stage::materialize;
use super::{MaterializationMode, SandboxError, SandboxInstance};
use crate::events::{EventChannel, SandboxEvent};
use crate::graph::ArtifactKind;
use crate::strategy::Spawn;
use crate::sync::Arc;
use crate::Config;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::*;
use uuid::Uuid;

/// Creates sandboxes below a single root directory.
///
/// The sandboxing steps are as follows:
///
///   1. create a fresh `<root>/<uuid>` directory with an `execroot` and a `tmp` inside
///   2. place every declared input at its relative path within the `execroot`
///   3. create the parent directories of every declared output
///
/// Running the command, validating and promoting its outputs is up to the caller.
///
#[derive(Debug, Clone)]
pub struct SandboxManager {
    root: PathBuf,
    mode: MaterializationMode,
    keep_sandboxes: bool,
    event_channel: Arc<EventChannel>,
}

impl SandboxManager {
    pub fn new(
        root: PathBuf,
        mode: MaterializationMode,
        keep_sandboxes: bool,
        event_channel: Arc<EventChannel>,
    ) -> Self {
        Self {
            root,
            mode,
            keep_sandboxes,
            event_channel,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.sandbox_root().clone(),
            config.materialization(),
            config.keep_sandboxes(),
            config.event_channel(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[tracing::instrument(name = "SandboxManager::create", skip(self, spawn), fields(kiln.owner = %spawn.owner))]
    pub async fn create(&self, spawn: &Spawn) -> Result<SandboxInstance, SandboxError> {
        let root = self.root.join(Uuid::new_v4().to_string());

        // From here on the instance owns the directory, so any early return below removes it.
        let sandbox = SandboxInstance::new(
            root.clone(),
            self.keep_sandboxes,
            self.event_channel.clone(),
        );
        create_dir(sandbox.execroot()).await?;
        create_dir(sandbox.tmp()).await?;

        for input in &spawn.inputs {
            if input.kind == ArtifactKind::Middleman {
                continue;
            }
            let dst = sandbox.execroot().join(&input.path);
            materialize(&input.location, &dst, self.mode).await?;
        }

        for output in &spawn.outputs {
            let dst = sandbox.execroot().join(&output.path);
            match output.kind {
                ArtifactKind::Tree => create_dir(&dst).await?,
                _ => {
                    if let Some(parent) = dst.parent() {
                        create_dir(parent).await?;
                    }
                }
            }
        }

        debug!("Created sandbox at: {:?}", root);
        self.event_channel
            .send(SandboxEvent::SandboxCreated { path: root });

        Ok(sandbox)
    }
}

async fn create_dir(path: &Path) -> Result<(), SandboxError> {
    fs::create_dir_all(path)
        .await
        .map_err(|err| SandboxError::CouldNotCreateDir {
            path: path.to_path_buf(),
            err,
        })
}
