//! Mapping requested names onto files under the served root.
//!
//! A name is accepted only if it is a relative path made of normal
//! components and, once symlinks are resolved, still points inside the
//! root. Every rejection is answered the same way on the wire, so the
//! reasons here only show up in the server log.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Why a requested name cannot be served.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("name is not a valid path")]
    InvalidName,
    #[error("name escapes the root directory")]
    Unsafe,
    #[error("no such file")]
    Missing,
    #[error("not a regular file")]
    NotRegular,
    #[error("cannot access file: {0}")]
    Inaccessible(#[source] io::Error),
}

/// Turn raw request bytes into a relative path with only normal components.
pub fn request_path(name: &[u8]) -> Result<PathBuf, Rejection> {
    if name.contains(&0) {
        return Err(Rejection::Unsafe);
    }

    let requested = bytes_to_path(name)?;
    let mut safe = PathBuf::new();
    for component in requested.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => safe.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Rejection::Unsafe);
            }
        }
    }

    if safe.as_os_str().is_empty() {
        return Err(Rejection::InvalidName);
    }
    Ok(safe)
}

/// Resolve `name` under `root` to a regular file.
///
/// `root` must already be canonical.
pub async fn resolve(root: &Path, name: &[u8]) -> Result<PathBuf, Rejection> {
    let joined = root.join(request_path(name)?);

    let canonical = tokio::fs::canonicalize(&joined).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Rejection::Missing,
        _ => Rejection::Inaccessible(e),
    })?;

    // A symlink inside the root can still point outside of it
    if !canonical.starts_with(root) {
        return Err(Rejection::Unsafe);
    }

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(Rejection::Inaccessible)?;
    if !metadata.is_file() {
        return Err(Rejection::NotRegular);
    }

    Ok(canonical)
}

#[cfg(unix)]
fn bytes_to_path(name: &[u8]) -> Result<PathBuf, Rejection> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    Ok(PathBuf::from(OsStr::from_bytes(name)))
}

#[cfg(not(unix))]
fn bytes_to_path(name: &[u8]) -> Result<PathBuf, Rejection> {
    std::str::from_utf8(name)
        .map(PathBuf::from)
        .map_err(|_| Rejection::InvalidName)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn root_with_files() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"nested").unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn test_request_path() {
        assert_eq!(request_path(b"a.txt").unwrap(), PathBuf::from("a.txt"));
        assert_eq!(request_path(b"./sub/b.txt").unwrap(), PathBuf::from("sub/b.txt"));
        assert!(matches!(request_path(b"."), Err(Rejection::InvalidName)));
    }

    #[test]
    fn test_request_path_rejects_escapes() {
        assert!(matches!(request_path(b"../a.txt"), Err(Rejection::Unsafe)));
        assert!(matches!(request_path(b"sub/../../a.txt"), Err(Rejection::Unsafe)));
        assert!(matches!(request_path(b"/etc/passwd"), Err(Rejection::Unsafe)));
        assert!(matches!(request_path(b"a.txt\0"), Err(Rejection::Unsafe)));
    }

    #[tokio::test]
    async fn test_resolve_regular_file() {
        let (_dir, root) = root_with_files();

        let path = resolve(&root, b"a.txt").await.unwrap();
        assert_eq!(path, root.join("a.txt"));

        let path = resolve(&root, b"sub/b.txt").await.unwrap();
        assert_eq!(path, root.join("sub").join("b.txt"));
    }

    #[tokio::test]
    async fn test_resolve_missing_and_directory() {
        let (_dir, root) = root_with_files();

        assert!(matches!(
            resolve(&root, b"missing.txt").await,
            Err(Rejection::Missing)
        ));
        assert!(matches!(
            resolve(&root, b"sub").await,
            Err(Rejection::NotRegular)
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_parent_dir() {
        let (dir, root) = root_with_files();
        let outside = dir.path().parent().unwrap().join("outside.txt");
        let name = format!("../{}", outside.file_name().unwrap().to_str().unwrap());

        assert!(matches!(
            resolve(&root, name.as_bytes()).await,
            Err(Rejection::Unsafe)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let (_dir, root) = root_with_files();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("link.txt"))
            .unwrap();

        assert!(matches!(
            resolve(&root, b"link.txt").await,
            Err(Rejection::Unsafe)
        ));
    }
}
