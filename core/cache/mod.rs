//! # Result Cache
//!
//! Maps an `ActionKey` to the outputs a previous execution of that key produced, so that an
//! action whose command and inputs have not changed is never run twice.
//!
mod entry;
mod error;
mod inflight;
mod local;

pub use entry::*;
pub use error::*;
pub use inflight::*;
pub use local::*;

use crate::fingerprint::ActionKey;
use async_trait::async_trait;
use std::path::Path;

/// The ActionCache trait represents an abstract, persisted store of previous executions.
///
/// Lookups never fail: an entry that cannot be read for any reason is simply a miss.
///
#[async_trait]
pub trait ActionCache: Send + Sync + std::fmt::Debug {
    async fn lookup(&self, key: &ActionKey) -> Option<CacheEntry>;

    /// Persist `entry`, together with the content of its outputs as found in `output_root`.
    async fn store(&self, entry: &CacheEntry, output_root: &Path) -> Result<(), CacheError>;

    /// Make sure every output of `entry` is present in `output_root` with the recorded content.
    /// Returns false when that is not possible, and the entry should be treated as a miss.
    async fn restore(&self, entry: &CacheEntry, output_root: &Path) -> Result<bool, CacheError>;
}
