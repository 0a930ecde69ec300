use super::*;
use crate::events::{CacheEvent, EventChannel};
use crate::fingerprint::{Fingerprint, FingerprintError};
use crate::graph::ArtifactKind;
use crate::sync::Arc;
use crate::util::fs::{copy_tree, remove_path};
use crate::Config;
use std::path::PathBuf;
use tokio::fs;
use tracing::*;
use uuid::Uuid;

/// A result cache on the local file system.
///
/// Its layout is:
///
/// ```text
/// <root>/ac/<key[0..2]>/<key>.json   one CacheEntry per action key
/// <root>/cas/<fingerprint>           output contents, a file or a directory for trees
/// ```
///
/// Every write goes to a temporary file first and is then renamed into place, so a crash never
/// leaves a half-written entry or blob behind.
///
#[derive(Debug, Clone)]
pub struct LocalActionCache {
    root: PathBuf,
    event_channel: Arc<EventChannel>,
}

impl LocalActionCache {
    pub fn new(root: PathBuf, event_channel: Arc<EventChannel>) -> Self {
        Self {
            root,
            event_channel,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_root().clone(), config.event_channel())
    }

    pub fn entry_path(&self, key: &ActionKey) -> PathBuf {
        let key = key.as_str();
        let shard = key.get(..2).unwrap_or(key);
        self.root.join("ac").join(shard).join(format!("{}.json", key))
    }

    pub fn blob_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join("cas").join(fingerprint.as_str())
    }

    fn corrupted(&self, key: &ActionKey, reason: String) {
        warn!("Ignoring corrupted cache entry for {}: {}", key, reason);
        self.event_channel.send(CacheEvent::CacheEntryCorrupted {
            key: key.to_string(),
            reason,
        });
    }

    /// Place `src` into the CAS under `fingerprint`, unless it is already there.
    async fn save_blob(
        &self,
        src: &Path,
        kind: ArtifactKind,
        fingerprint: &Fingerprint,
    ) -> Result<(), CacheError> {
        let blob = self.blob_path(fingerprint);
        if fs::symlink_metadata(&blob).await.is_ok() {
            return Ok(());
        }
        let write_err = |err| CacheError::CouldNotWrite {
            path: blob.clone(),
            err,
        };

        let tmp = temp_sibling(&blob);
        if let Some(parent) = blob.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let copied = match kind {
            ArtifactKind::Tree => copy_tree(src, &tmp).await,
            _ => fs::copy(src, &tmp).await.map(|_| ()),
        };
        if let Err(err) = copied {
            let _ = remove_path(&tmp).await;
            return Err(write_err(err));
        }

        match fs::rename(&tmp, &blob).await {
            Ok(()) => Ok(()),
            // Someone else stored the same content first.
            Err(_) if fs::symlink_metadata(&blob).await.is_ok() => {
                let _ = remove_path(&tmp).await;
                Ok(())
            }
            Err(err) => {
                let _ = remove_path(&tmp).await;
                Err(write_err(err))
            }
        }
    }

    /// Copy a blob out of the CAS into `dst`, replacing whatever was there.
    ///
    /// The copy is fingerprinted before it is renamed into place. A blob whose content no longer
    /// matches `fingerprint` is deleted, and `Ok(false)` is returned with `dst` left untouched.
    ///
    async fn restore_blob(
        &self,
        key: &ActionKey,
        blob: &Path,
        kind: ArtifactKind,
        fingerprint: &Fingerprint,
        dst: &Path,
    ) -> Result<bool, CacheError> {
        let write_err = |err| CacheError::CouldNotWrite {
            path: dst.to_path_buf(),
            err,
        };
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = temp_sibling(dst);
        let copied = match kind {
            ArtifactKind::Tree => copy_tree(blob, &tmp).await,
            _ => fs::copy(blob, &tmp).await.map(|_| ()),
        };
        if let Err(err) = copied {
            let _ = remove_path(&tmp).await;
            return Err(CacheError::CouldNotRead {
                path: blob.to_path_buf(),
                err,
            });
        }

        match current_fingerprint(&tmp, kind).await {
            Some(actual) if &actual == fingerprint => (),
            actual => {
                let _ = remove_path(&tmp).await;
                let _ = remove_path(blob).await;
                let found = actual
                    .map(|fp| fp.to_string())
                    .unwrap_or_else(|| "nothing readable".to_string());
                self.corrupted(
                    key,
                    format!("blob {:?} should hash to {} but holds {}", blob, fingerprint, found),
                );
                return Ok(false);
            }
        }

        remove_path(dst).await.map_err(write_err)?;
        fs::rename(&tmp, dst).await.map_err(write_err)?;
        Ok(true)
    }
}

#[async_trait]
impl ActionCache for LocalActionCache {
    #[tracing::instrument(name = "LocalActionCache::lookup", skip(self))]
    async fn lookup(&self, key: &ActionKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                self.corrupted(key, format!("could not read {:?}: {}", path, err));
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                self.corrupted(key, format!("could not parse {:?}: {}", path, err));
                return None;
            }
        };

        if entry.version != CACHE_ENTRY_VERSION {
            self.corrupted(key, format!("unsupported version {}", entry.version));
            return None;
        }

        if &entry.key != key {
            self.corrupted(key, format!("entry is for a different key {}", entry.key));
            return None;
        }

        Some(entry)
    }

    #[tracing::instrument(name = "LocalActionCache::store", skip(self, entry), fields(kiln.key = %entry.key))]
    async fn store(&self, entry: &CacheEntry, output_root: &Path) -> Result<(), CacheError> {
        for out in &entry.outputs {
            if out.kind == ArtifactKind::Middleman {
                continue;
            }
            self.save_blob(&output_root.join(&out.path), out.kind, &out.fingerprint)
                .await?;
        }

        let path = self.entry_path(&entry.key);
        let write_err = |err| CacheError::CouldNotWrite {
            path: path.clone(),
            err,
        };
        let json = serde_json::to_vec_pretty(entry).map_err(CacheError::CouldNotSerialize)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = temp_sibling(&path);
        fs::write(&tmp, json).await.map_err(write_err)?;
        fs::rename(&tmp, &path).await.map_err(write_err)?;

        debug!("Cached {} at {:?}", entry.owner, path);
        self.event_channel.send(CacheEvent::CacheStored {
            key: entry.key.to_string(),
        });
        Ok(())
    }

    #[tracing::instrument(name = "LocalActionCache::restore", skip(self, entry), fields(kiln.key = %entry.key))]
    async fn restore(&self, entry: &CacheEntry, output_root: &Path) -> Result<bool, CacheError> {
        let mut to_restore = vec![];
        for out in &entry.outputs {
            if out.kind == ArtifactKind::Middleman {
                continue;
            }
            let dst = output_root.join(&out.path);
            match current_fingerprint(&dst, out.kind).await {
                Some(fingerprint) if fingerprint == out.fingerprint => continue,
                _ => (),
            }

            let blob = self.blob_path(&out.fingerprint);
            if fs::symlink_metadata(&blob).await.is_err() {
                debug!("Blob {:?} is missing from the cache", blob);
                return Ok(false);
            }
            to_restore.push((blob, out, dst));
        }

        for (blob, out, dst) in to_restore {
            if !self
                .restore_blob(&entry.key, &blob, out.kind, &out.fingerprint, &dst)
                .await?
            {
                return Ok(false);
            }
            trace!("Restored {:?} from {:?}", dst, blob);
        }

        Ok(true)
    }
}

async fn current_fingerprint(path: &Path, kind: ArtifactKind) -> Option<Fingerprint> {
    let result: Result<Fingerprint, FingerprintError> = Fingerprint::of_path(path, kind).await;
    result.ok()
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}
