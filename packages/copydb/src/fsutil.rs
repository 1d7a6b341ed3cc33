//! Durable file writes shared by markers and the restore manifest.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Write `contents` to `path` so that readers see either the old file or the
/// complete new one, and the new one survives a crash once this returns.
///
/// The data goes to a sibling `.tmp` file, is synced, renamed into place, and
/// the parent directory is synced so the rename itself is on disk. On failure
/// the `.tmp` file is removed again.
pub(crate) async fn write_durable(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = replace_with_tmp(&tmp, path, contents).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    sync_parent_dir(path).await
}

async fn replace_with_tmp(tmp: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp, path).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::File::open(parent).await?.sync_all().await
        }
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_durable_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("indexes").join("42.done");

        write_durable(&path, b"first").await.unwrap();
        write_durable(&path, b"second").await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"second");
        assert!(!tmp_path(&path).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexes").join("42.done");
        // A non-empty directory in the way makes the rename fail
        std::fs::create_dir_all(path.join("child")).unwrap();

        assert!(write_durable(&path, b"done").await.is_err());

        assert!(!tmp_path(&path).exists());
        assert!(path.join("child").is_dir());
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let tmp = tmp_path(Path::new("/w/schema/post.list"));
        assert_eq!(tmp, PathBuf::from("/w/schema/post.list.tmp"));
    }
}
