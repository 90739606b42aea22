//! Per-run staging directories.

use ansiblerun_core::Uid;
use ansiblerun_core::fs::{DEFAULT_DIR_MODE, Filesystem};
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Mode of every file written into a staging directory.
pub const FILE_MODE: u32 = 0o600;

/// Creates working directories keyed by run identity under a base path,
/// and writes files into them.
#[derive(Clone)]
pub struct Staging {
    fs: Arc<dyn Filesystem>,
    base: PathBuf,
}

impl Staging {
    pub fn new(fs: Arc<dyn Filesystem>, base: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base: base.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn fs(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    /// The directory owned by `uid`. Fails for identities that are not a
    /// single path segment.
    pub fn dir(&self, uid: &Uid) -> io::Result<PathBuf> {
        if !uid.is_path_safe() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("uid {:?} is not a valid directory name", uid.as_str()),
            ));
        }
        Ok(self.base.join(uid.as_str()))
    }

    /// Create the directory owned by `uid` and its ancestors. An existing
    /// directory is not an error.
    pub async fn ensure_directory(&self, uid: &Uid) -> io::Result<PathBuf> {
        let dir = self.dir(uid)?;
        self.fs.create_dir_all(&dir, DEFAULT_DIR_MODE).await?;
        debug!(uid = %uid, dir = %dir.display(), "Staging directory ready");
        Ok(dir)
    }

    /// Write `contents` to `path`, replacing any previous file.
    pub async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.fs.write_file(path, contents, FILE_MODE).await
    }
}

/// The final component of `filename`, if it names a regular entry.
///
/// Rejects empty names, `.`, and names whose last component is `..`.
pub fn safe_file_name(filename: &str) -> Option<&OsStr> {
    let path = Path::new(filename);
    match path.components().next_back()? {
        Component::Normal(name) => Some(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ansiblerun_core::fs::MemFs;

    #[tokio::test]
    async fn test_ensure_directory_keyed_by_uid() {
        let fs = Arc::new(MemFs::new());
        let staging = Staging::new(fs.clone(), "/ansibleDir");

        let dir = staging.ensure_directory(&Uid::new("no-you-id")).await.unwrap();
        assert_eq!(dir, PathBuf::from("/ansibleDir/no-you-id"));
        assert!(fs.is_dir("/ansibleDir/no-you-id"));
        assert_eq!(fs.mode("/ansibleDir/no-you-id"), Some(0o700));

        // Existing directory is fine
        staging.ensure_directory(&Uid::new("no-you-id")).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_directory_rejects_traversal() {
        let fs = Arc::new(MemFs::new());
        let staging = Staging::new(fs.clone(), "/ansibleDir");

        for uid in ["", "..", "a/b"] {
            let err = staging.ensure_directory(&Uid::new(uid)).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(!fs.is_dir("/ansibleDir"));
    }

    #[tokio::test]
    async fn test_write_file_mode() {
        let fs = Arc::new(MemFs::new());
        let staging = Staging::new(fs.clone(), "/ansibleDir");

        staging
            .write_file(Path::new("/ansibleDir/u/playbook.yml"), b"hello: world")
            .await
            .unwrap();
        assert_eq!(fs.mode("/ansibleDir/u/playbook.yml"), Some(0o600));
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("credentials"), Some(OsStr::new("credentials")));
        assert_eq!(safe_file_name("nested/creds.json"), Some(OsStr::new("creds.json")));
        assert_eq!(safe_file_name("../../etc/passwd"), Some(OsStr::new("passwd")));
        assert_eq!(safe_file_name(""), None);
        assert_eq!(safe_file_name("."), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("a/.."), None);
        assert_eq!(safe_file_name("/"), None);
    }
}
