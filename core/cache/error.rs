use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Could not write to the cache at {path:?} due to {err:?}")]
    CouldNotWrite { path: PathBuf, err: std::io::Error },

    #[error("Could not read {path:?} from the cache due to {err:?}")]
    CouldNotRead { path: PathBuf, err: std::io::Error },

    #[error("Could not serialize cache entry due to {0:?}")]
    CouldNotSerialize(serde_json::Error),
}
