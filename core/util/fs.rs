use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Recursively list every file below `root`, sorted. Directory symlinks are not followed.
///
pub(crate) fn scan_files(root: &Path) -> BoxFuture<'_, io::Result<Vec<PathBuf>>> {
    async move {
        let mut entries = vec![];
        let mut read_dir = fs::read_dir(root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                entries.extend(scan_files(&path).await?);
            } else {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }
    .boxed()
}

/// Copy a directory tree, file by file, creating `dst` and any missing parents.
///
pub(crate) async fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst).await?;
    for file in scan_files(src).await? {
        let rel = file
            .strip_prefix(src)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&file, &target).await?;
    }
    Ok(())
}

/// Remove a file, symlink, or directory tree. Missing paths are not an error.
///
pub(crate) async fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

/// Move `src` to `dst`, replacing whatever was at `dst`.
///
/// A rename is attempted first so that readers never observe a half-written file. When that is
/// not possible (`src` and `dst` live on different devices) we fall back to copying.
///
pub(crate) async fn relocate(src: &Path, dst: &Path) -> io::Result<()> {
    remove_path(dst).await?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    if fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }

    if fs::symlink_metadata(src).await?.is_dir() {
        copy_tree(src, dst).await?;
    } else {
        fs::copy(src, dst).await?;
    }
    remove_path(src).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[tokio::test]
    async fn scanning_lists_nested_files() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("a.txt").touch().unwrap();
        root.child("nested/deeper/b.txt").touch().unwrap();

        let files = scan_files(root.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                root.path().join("a.txt"),
                root.path().join("nested/deeper/b.txt")
            ]
        );
    }

    #[tokio::test]
    async fn copying_a_tree_preserves_contents() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("src/one.txt").write_str("1").unwrap();
        root.child("src/dir/two.txt").write_str("2").unwrap();

        copy_tree(&root.path().join("src"), &root.path().join("dst"))
            .await
            .unwrap();

        root.child("dst/one.txt").assert("1");
        root.child("dst/dir/two.txt").assert("2");
        root.child("src/one.txt").assert("1");
    }

    #[tokio::test]
    async fn removing_missing_paths_is_fine() {
        let root = assert_fs::TempDir::new().unwrap();
        remove_path(&root.path().join("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn relocating_replaces_the_destination() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("from/out.txt").write_str("new").unwrap();
        root.child("to/out.txt").write_str("old").unwrap();

        relocate(
            &root.path().join("from/out.txt"),
            &root.path().join("to/out.txt"),
        )
        .await
        .unwrap();

        root.child("to/out.txt").assert("new");
        assert!(!root.path().join("from/out.txt").exists());
    }
}
