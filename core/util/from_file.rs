use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Error, Debug)]
pub enum FromFileError {
    #[error("Could not open file at {file:?} due to {err:?}")]
    CouldNotOpenFile { err: std::io::Error, file: PathBuf },

    #[error("Could not read file at {file:?} due to {err:?}")]
    CouldNotReadFile { err: std::io::Error, file: PathBuf },

    #[error("Could not parse file at {file:?} due to {err:?}")]
    ParseError {
        err: serde_json::Error,
        file: PathBuf,
        bytes: String,
    },
}

/// Read and parse a JSON document from disk.
///
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FromFileError> {
    let mut file =
        tokio::fs::File::open(&path)
            .await
            .map_err(|err| FromFileError::CouldNotOpenFile {
                err,
                file: path.to_path_buf(),
            })?;

    let mut bytes = vec![];
    file.read_to_end(&mut bytes)
        .await
        .map_err(|err| FromFileError::CouldNotReadFile {
            err,
            file: path.to_path_buf(),
        })?;

    serde_json::from_slice(&bytes).map_err(|err| FromFileError::ParseError {
        err,
        file: path.to_path_buf(),
        bytes: String::from_utf8_lossy(&bytes).to_string(),
    })
}
