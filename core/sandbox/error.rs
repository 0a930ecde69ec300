use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Could not create sandbox directory {path:?} due to {err:?}")]
    CouldNotCreateDir { path: PathBuf, err: std::io::Error },

    #[error("Could not place input {src:?} into sandbox at {dst:?} due to {err:?}")]
    CouldNotMaterialize {
        src: PathBuf,
        dst: PathBuf,
        err: std::io::Error,
    },
}
