//! Filesystem capability.
//!
//! The connector only touches storage through [`Filesystem`], so tests can
//! swap the real filesystem for [`MemFs`] and wrap either in [`FaultyFs`] to
//! force a failure at one exact path.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Mode used for directories created implicitly by [`Filesystem::write_file`].
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Minimal filesystem operations needed to stage a run.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Create `path` and all missing ancestors. Succeeds if it already exists.
    async fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Replace the contents of `path`, creating parent directories as needed.
    ///
    /// On failure the file is either absent or holds its previous contents.
    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()>;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[async_trait]
impl<T: Filesystem + ?Sized> Filesystem for Arc<T> {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        (**self).create_dir_all(path, mode).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        (**self).write_file(path, contents, mode).await
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read_file(path).await
    }
}

/// The operating system's filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    fn temp_path(path: &Path) -> io::Result<PathBuf> {
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?;
        let tmp_name = format!(".{}.{}.tmp", file_name.to_string_lossy(), Uuid::new_v4());
        Ok(path.with_file_name(tmp_name))
    }
}

/// A temporary file removed on drop unless persisted.
///
/// Covers the write future being dropped part way through.
struct TempFile {
    path: PathBuf,
    persisted: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self) {
        self.persisted = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl Filesystem for OsFs {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.create_dir_all(parent, DEFAULT_DIR_MODE).await?;
        }

        // Write next to the target and rename over it so readers never see a
        // truncated file.
        let tmp = TempFile::new(Self::temp_path(path)?);
        let result: io::Result<()> = async {
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(mode);
            let mut file = options.open(tmp.path()).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);

            // The umask may have narrowed the mode passed to open.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))
                    .await?;
            }
            #[cfg(not(unix))]
            let _ = mode;

            tokio::fs::rename(tmp.path(), path).await?;
            tmp.persist();
            Ok(())
        }
        .await;

        debug!(path = %path.display(), bytes = contents.len(), ok = result.is_ok(), "Wrote file");
        result
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

#[derive(Debug, Clone)]
enum MemNode {
    Dir { mode: u32 },
    File { data: Vec<u8>, mode: u32 },
}

/// An in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<PathBuf, MemNode>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of the file at `path`, if one exists.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().get(path.as_ref()) {
            Some(MemNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.lock().get(path.as_ref()), Some(MemNode::Dir { .. }))
    }

    /// Permission bits of the file or directory at `path`.
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.lock().get(path.as_ref()).map(|node| match node {
            MemNode::Dir { mode } | MemNode::File { mode, .. } => *mode,
        })
    }

    /// Paths of every file, in sorted order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock()
            .iter()
            .filter(|(_, node)| matches!(node, MemNode::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, MemNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mkdir_all_locked(
        nodes: &mut BTreeMap<PathBuf, MemNode>,
        path: &Path,
        mode: u32,
    ) -> io::Result<()> {
        let mut ancestors: Vec<&Path> = path
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        ancestors.reverse();

        for dir in ancestors {
            match nodes.get(dir) {
                Some(MemNode::Dir { .. }) => {}
                Some(MemNode::File { .. }) => {
                    return Err(io::Error::other(format!(
                        "{} exists and is not a directory",
                        dir.display()
                    )));
                }
                None => {
                    nodes.insert(dir.to_path_buf(), MemNode::Dir { mode });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemFs {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        Self::mkdir_all_locked(&mut self.lock(), path, mode)
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        let mut nodes = self.lock();
        if let Some(MemNode::Dir { .. }) = nodes.get(path) {
            return Err(io::Error::other(format!("{} is a directory", path.display())));
        }
        if let Some(parent) = path.parent() {
            Self::mkdir_all_locked(&mut nodes, parent, DEFAULT_DIR_MODE)?;
        }
        nodes.insert(
            path.to_path_buf(),
            MemNode::File {
                data: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().get(path) {
            Some(MemNode::File { data, .. }) => Ok(data.clone()),
            Some(MemNode::Dir { .. }) => Err(io::Error::other(format!(
                "{} is a directory",
                path.display()
            ))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )),
        }
    }
}

/// Decorates a filesystem so that any operation on a registered path fails.
///
/// Paths are matched exactly, without normalization.
pub struct FaultyFs {
    inner: Arc<dyn Filesystem>,
    errs: HashMap<PathBuf, (io::ErrorKind, String)>,
}

impl FaultyFs {
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            inner,
            errs: HashMap::new(),
        }
    }

    /// Fail every operation on `path` with an error of `kind` and `message`.
    pub fn fail(mut self, path: impl Into<PathBuf>, kind: io::ErrorKind, message: impl Into<String>) -> Self {
        self.errs.insert(path.into(), (kind, message.into()));
        self
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        match self.errs.get(path) {
            Some((kind, message)) => Err(io::Error::new(*kind, message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Filesystem for FaultyFs {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.check(path)?;
        self.inner.create_dir_all(path, mode).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        self.check(path)?;
        self.inner.write_file(path, contents, mode).await
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.check(path)?;
        self.inner.read_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memfs_write_creates_parents() {
        let fs = MemFs::new();
        fs.write_file(Path::new("/base/uid/creds"), b"secret", 0o600)
            .await
            .unwrap();

        assert!(fs.is_dir("/base"));
        assert!(fs.is_dir("/base/uid"));
        assert_eq!(fs.contents("/base/uid/creds"), Some(b"secret".to_vec()));
        assert_eq!(fs.mode("/base/uid/creds"), Some(0o600));
    }

    #[tokio::test]
    async fn test_memfs_overwrite_replaces_contents() {
        let fs = MemFs::new();
        let path = Path::new("/base/uid/playbook.yml");
        fs.write_file(path, b"first version", 0o600).await.unwrap();
        fs.write_file(path, b"second", 0o600).await.unwrap();

        assert_eq!(fs.contents(path), Some(b"second".to_vec()));
        assert_eq!(fs.files(), vec![PathBuf::from("/base/uid/playbook.yml")]);
    }

    #[tokio::test]
    async fn test_memfs_mkdir_is_idempotent() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("/base/uid"), 0o700).await.unwrap();
        fs.create_dir_all(Path::new("/base/uid"), 0o700).await.unwrap();
        assert!(fs.is_dir("/base/uid"));
    }

    #[tokio::test]
    async fn test_memfs_mkdir_through_file_fails() {
        let fs = MemFs::new();
        fs.write_file(Path::new("/base/file"), b"x", 0o600).await.unwrap();
        assert!(fs.create_dir_all(Path::new("/base/file/sub"), 0o700).await.is_err());
    }

    #[tokio::test]
    async fn test_memfs_read_missing_file() {
        let fs = MemFs::new();
        let err = fs.read_file(Path::new("/nope")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_faulty_fs_fails_exact_path_only() {
        let mem = Arc::new(MemFs::new());
        let fs = FaultyFs::new(mem.clone()).fail(
            "/base/uid/creds",
            io::ErrorKind::PermissionDenied,
            "boom",
        );

        let err = fs
            .write_file(Path::new("/base/uid/creds"), b"x", 0o600)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "boom");
        assert!(mem.contents("/base/uid/creds").is_none());

        fs.write_file(Path::new("/base/uid/other"), b"y", 0o600)
            .await
            .unwrap();
        assert_eq!(mem.contents("/base/uid/other"), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn test_osfs_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/creds");

        OsFs.write_file(&path, b"token", 0o600).await.unwrap();
        assert_eq!(OsFs.read_file(&path).await.unwrap(), b"token");

        OsFs.write_file(&path, b"rotated", 0o600).await.unwrap();
        assert_eq!(OsFs.read_file(&path).await.unwrap(), b"rotated");

        // No temp files are left behind.
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("creds")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_osfs_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds");
        OsFs.write_file(&path, b"token", 0o600).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_temp_file_removed_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();

        let dropped = dir.path().join(".creds.1.tmp");
        std::fs::write(&dropped, b"partial").unwrap();
        drop(TempFile::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = dir.path().join(".creds.2.tmp");
        std::fs::write(&kept, b"complete").unwrap();
        TempFile::new(kept.clone()).persist();
        assert!(kept.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_osfs_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("inner"), b"x").unwrap();

        // Renaming a file over a directory fails.
        assert!(OsFs.write_file(&path, b"token", 0o600).await.is_err());

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("creds")]);
    }

    #[tokio::test]
    async fn test_osfs_mkdir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base/uid");
        OsFs.create_dir_all(&path, 0o700).await.unwrap();
        OsFs.create_dir_all(&path, 0o700).await.unwrap();
        assert!(path.is_dir());
    }
}
