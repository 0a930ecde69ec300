use crate::events::{EventChannel, SandboxEvent};
use crate::sync::Arc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::*;

/// A single sandbox on disk, exclusively owned by one execution.
///
/// Dropping a `SandboxInstance` deletes it, so it is cleaned up on every exit path, including
/// errors, panics, and the executing future being cancelled. Call `remove` to do the same without
/// blocking the runtime.
///
#[derive(Debug)]
pub struct SandboxInstance {
    root: PathBuf,
    execroot: PathBuf,
    tmp: PathBuf,
    keep: bool,
    released: bool,
    event_channel: Arc<EventChannel>,
}

impl SandboxInstance {
    pub(crate) fn new(root: PathBuf, keep: bool, event_channel: Arc<EventChannel>) -> Self {
        Self {
            execroot: root.join("execroot"),
            tmp: root.join("tmp"),
            root,
            keep,
            released: false,
            event_channel,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The working directory of the sandboxed command.
    pub fn execroot(&self) -> &Path {
        &self.execroot
    }

    pub fn tmp(&self) -> &Path {
        &self.tmp
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.root.join("stdout.log")
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.root.join("stderr.log")
    }

    /// The environment of a sandboxed command: only what it declared, plus `TMPDIR` pointing at
    /// the sandbox scratch space unless it declared its own.
    pub fn env(&self, declared: &BTreeMap<String, String>) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = declared
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.entry("TMPDIR".to_string())
            .or_insert_with(|| self.tmp.to_string_lossy().to_string());
        env
    }

    #[tracing::instrument(name = "SandboxInstance::remove", skip(self), fields(kiln.sandbox = ?self.root))]
    pub async fn remove(mut self) {
        self.released = true;
        if self.keep {
            self.kept();
            return;
        }
        let result = crate::util::fs::remove_path(&self.root).await;
        self.removed(result);
    }

    fn kept(&self) {
        debug!("Keeping sandbox at {:?}", self.root);
        self.event_channel.send(SandboxEvent::SandboxKept {
            path: self.root.clone(),
        });
    }

    fn removed(&self, result: std::io::Result<()>) {
        match result {
            Ok(()) => {
                trace!("Removed sandbox at {:?}", self.root);
                self.event_channel.send(SandboxEvent::SandboxRemoved {
                    path: self.root.clone(),
                });
            }
            Err(err) => {
                warn!("Could not remove sandbox at {:?} due to {:?}", self.root, err);
                self.event_channel.send(SandboxEvent::SandboxCleanupFailed {
                    path: self.root.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
}

impl Drop for SandboxInstance {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.keep {
            self.kept();
            return;
        }
        let result = match std::fs::remove_dir_all(&self.root) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            result => result,
        };
        self.removed(result);
    }
}
