use serde_derive::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A handle to an `Artifact` in an `ActionGraph`. It is only meaningful for the graph (or
/// builder) that handed it out.
///
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub(crate) u32);

impl ArtifactId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Artifact({})", self.0)
    }
}

/// The tree an artifact lives in.
///
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Root {
    /// Pre-existing files. Never written to by actions.
    #[default]
    Source,

    /// Files produced by actions.
    Output,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    #[default]
    File,

    /// A directory whose contents are only known once its producer has run.
    Tree,

    /// An abstract grouping of other artifacts. It has no content on disk.
    Middleman,
}

/// A named location that an action reads or writes.
///
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    path: PathBuf,
    root: Root,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn new<P: Into<PathBuf>>(path: P, root: Root, kind: ArtifactKind) -> Self {
        Self {
            path: path.into(),
            root,
            kind,
        }
        .normalized()
    }

    /// Drop `.` components, so `./out.txt` and `out.txt` name the same artifact.
    pub(crate) fn normalized(mut self) -> Self {
        if self.path.components().any(|c| c == Component::CurDir) {
            self.path = self
                .path
                .components()
                .filter(|c| *c != Component::CurDir)
                .collect();
        }
        self
    }

    pub fn source<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, Root::Source, ArtifactKind::File)
    }

    pub fn output<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, Root::Output, ArtifactKind::File)
    }

    pub fn tree<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, Root::Output, ArtifactKind::Tree)
    }

    pub fn middleman<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, Root::Output, ArtifactKind::Middleman)
    }

    /// The path of this artifact relative to its root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> Root {
        self.root
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn is_source(&self) -> bool {
        self.root == Root::Source
    }

    pub fn is_middleman(&self) -> bool {
        self.kind == ArtifactKind::Middleman
    }

    /// Where this artifact lives on disk, given the roots of the current execution.
    pub fn resolve(&self, source_root: &Path, output_root: &Path) -> PathBuf {
        match self.root {
            Root::Source => source_root.join(&self.path),
            Root::Output => output_root.join(&self.path),
        }
    }

    /// Root-relative paths must be non-empty and must not escape their root.
    pub(crate) fn has_valid_path(&self) -> bool {
        !self.path.as_os_str().is_empty()
            && self
                .path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_valid() {
        assert!(Artifact::source("src/lib.rs").has_valid_path());
        assert!(Artifact::output("./out/a.o").has_valid_path());
    }

    #[test]
    fn current_dir_components_are_dropped() {
        assert_eq!(Artifact::output("./out.txt"), Artifact::output("out.txt"));
        assert_eq!(Artifact::source("./src/./lib.rs").path(), Path::new("src/lib.rs"));
        assert!(!Artifact::output(".").has_valid_path());
    }

    #[test]
    fn escaping_paths_are_invalid() {
        assert!(!Artifact::source("").has_valid_path());
        assert!(!Artifact::source("/etc/passwd").has_valid_path());
        assert!(!Artifact::output("../sibling/out.txt").has_valid_path());
        assert!(!Artifact::output("out/../../x").has_valid_path());
    }

    #[test]
    fn artifacts_resolve_against_their_root() {
        let src = Path::new("/ws");
        let out = Path::new("/ws/kiln-out");
        assert_eq!(
            Artifact::source("a.txt").resolve(src, out),
            PathBuf::from("/ws/a.txt")
        );
        assert_eq!(
            Artifact::output("a.txt").resolve(src, out),
            PathBuf::from("/ws/kiln-out/a.txt")
        );
    }
}
