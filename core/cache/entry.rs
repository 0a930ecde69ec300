use crate::fingerprint::{ActionKey, Fingerprint};
use crate::graph::ArtifactKind;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bumped whenever the layout of a `CacheEntry` changes. Entries of any other version are misses.
pub const CACHE_ENTRY_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOutput {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub fingerprint: Fingerprint,
}

/// The record of one successful execution. Entries are written once and never modified.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub key: ActionKey,
    pub owner: String,
    pub outputs: Vec<CachedOutput>,
    pub exit_code: i32,

    #[serde(with = "crate::util::serde::iso8601")]
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: ActionKey, owner: String, outputs: Vec<CachedOutput>, exit_code: i32) -> Self {
        Self {
            version: CACHE_ENTRY_VERSION,
            key,
            owner,
            outputs,
            exit_code,
            created_at: Utc::now(),
        }
    }
}
