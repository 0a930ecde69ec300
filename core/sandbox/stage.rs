use super::{MaterializationMode, SandboxError};
use crate::util::fs::{copy_tree, scan_files};
use std::path::Path;
use tokio::fs;

/// Place `src` at `dst`, creating any missing parent directories.
///
pub(crate) async fn materialize(
    src: &Path,
    dst: &Path,
    mode: MaterializationMode,
) -> Result<(), SandboxError> {
    let stage = async {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        let is_dir = fs::metadata(src).await?.is_dir();
        match (mode, is_dir) {
            (MaterializationMode::Symlink, _) => symlink(src, dst).await,
            (MaterializationMode::Copy, true) => copy_tree(src, dst).await,
            (MaterializationMode::Copy, false) => fs::copy(src, dst).await.map(|_| ()),
            (MaterializationMode::Hardlink, true) => hardlink_tree(src, dst).await,
            (MaterializationMode::Hardlink, false) => fs::hard_link(src, dst).await,
        }
    };

    stage
        .await
        .map_err(|err| SandboxError::CouldNotMaterialize {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            err,
        })
}

async fn hardlink_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst).await?;
    for file in scan_files(src).await? {
        let rel = file
            .strip_prefix(src)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::hard_link(&file, &target).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::symlink(src, dst).await
}

#[cfg(windows)]
async fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    if fs::metadata(src).await?.is_dir() {
        fs::symlink_dir(src, dst).await
    } else {
        fs::symlink_file(src, dst).await
    }
}
