use super::{ExecutionError, SpawnOutput};
use crate::fingerprint::Fingerprint;
use crate::graph::ArtifactKind;
use crate::util::fs::relocate;
use std::path::{Path, PathBuf};
use tracing::*;

/// Check that every declared output exists in `workdir`, fingerprint them, and move them into
/// `output_root`.
///
/// Nothing is moved unless every output is present, so a failed action never leaves a partial set
/// of outputs behind.
///
#[tracing::instrument(name = "outputs::collect_outputs", skip(outputs))]
pub(crate) async fn collect_outputs(
    workdir: &Path,
    outputs: &[SpawnOutput],
    output_root: &Path,
) -> Result<Vec<(PathBuf, Fingerprint)>, ExecutionError> {
    let mut expected_but_missing = vec![];
    for out in outputs {
        let present = match tokio::fs::metadata(workdir.join(&out.path)).await {
            Ok(meta) if out.kind == ArtifactKind::Tree => meta.is_dir(),
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        };
        if !present {
            expected_but_missing.push(out.path.clone());
        }
    }

    if !expected_but_missing.is_empty() {
        return Err(ExecutionError::MissingOutputs {
            missing: expected_but_missing,
        });
    }

    let mut fingerprints = Vec::with_capacity(outputs.len());
    for out in outputs {
        let src = workdir.join(&out.path);
        let fingerprint = Fingerprint::of_path(&src, out.kind).await?;
        fingerprints.push((out.path.clone(), fingerprint));
    }

    for out in outputs {
        let src = workdir.join(&out.path);
        let dst = output_root.join(&out.path);
        relocate(&src, &dst)
            .await
            .map_err(|err| ExecutionError::Relocation {
                src: src.clone(),
                dst: dst.clone(),
                err,
            })?;
        trace!("Promoted {:?} to {:?}", src, dst);
    }

    Ok(fingerprints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn file(path: &str) -> SpawnOutput {
        SpawnOutput {
            path: path.into(),
            kind: ArtifactKind::File,
        }
    }

    #[tokio::test]
    async fn promotes_declared_outputs_only() {
        let work = assert_fs::TempDir::new().unwrap();
        let out = assert_fs::TempDir::new().unwrap();
        work.child("a/b.txt").write_str("b").unwrap();
        work.child("stray.txt").write_str("stray").unwrap();

        let fingerprints = collect_outputs(work.path(), &[file("a/b.txt")], out.path())
            .await
            .unwrap();

        assert_eq!(
            fingerprints,
            vec![(PathBuf::from("a/b.txt"), Fingerprint::of_bytes(b"b"))]
        );
        out.child("a/b.txt").assert("b");
        out.child("stray.txt").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn every_missing_output_is_reported() {
        let work = assert_fs::TempDir::new().unwrap();
        let out = assert_fs::TempDir::new().unwrap();
        work.child("present.txt").write_str("here").unwrap();

        let outputs = [file("present.txt"), file("one.txt"), file("two.txt")];
        assert_matches!(
            collect_outputs(work.path(), &outputs, out.path()).await,
            Err(ExecutionError::MissingOutputs { missing })
                if missing == vec![PathBuf::from("one.txt"), PathBuf::from("two.txt")]
        );
        out.child("present.txt").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn tree_outputs_must_be_directories() {
        let work = assert_fs::TempDir::new().unwrap();
        let out = assert_fs::TempDir::new().unwrap();
        work.child("gen").write_str("not a dir").unwrap();

        let tree = SpawnOutput {
            path: "gen".into(),
            kind: ArtifactKind::Tree,
        };
        assert_matches!(
            collect_outputs(work.path(), &[tree], out.path()).await,
            Err(ExecutionError::MissingOutputs { .. })
        );
    }
}
