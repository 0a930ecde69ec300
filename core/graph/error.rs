use super::{ArtifactId, ArtifactKind};
use crate::util::from_file::FromFileError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors found while constructing an `ActionGraph`. Any of these aborts the whole build before
/// a single action is scheduled.
///
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Dependency cycle found starting at {owner}")]
    Cycle { owner: String },

    #[error("Both {first} and {second} declare {path:?} as an output")]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("{owner} declares the source file {path:?} as an output")]
    SourceArtifactAsOutput { owner: String, path: PathBuf },

    #[error("{consumer} depends on {path:?}, but no action produces it")]
    MissingProducer { consumer: String, path: PathBuf },

    #[error("{owner} refers to {artifact}, which was never registered")]
    UnknownArtifact { owner: String, artifact: ArtifactId },

    #[error("{path:?} was registered as a {existing:?} and again as a {requested:?}")]
    ConflictingArtifact {
        path: PathBuf,
        existing: ArtifactKind,
        requested: ArtifactKind,
    },

    #[error("Artifact paths must be relative and stay within their root, found {path:?}")]
    InvalidArtifactPath { path: PathBuf },

    #[error("Invalid action description: {reason}")]
    InvalidAction { reason: String },

    #[error(transparent)]
    CouldNotReadDescription(FromFileError),

    #[error("Could not parse graph description due to {0:?}")]
    CouldNotParseDescription(serde_json::Error),
}

impl From<FromFileError> for GraphError {
    fn from(err: FromFileError) -> Self {
        GraphError::CouldNotReadDescription(err)
    }
}
