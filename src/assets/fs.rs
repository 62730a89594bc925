//! Object store that writes objects below a local directory.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};

use super::{ObjectResult, ObjectStore, ObjectStoreError, UpsertPolicy};

/// Directory-backed [`ObjectStore`] with a public base URL.
///
/// The HTTP layer serves `root` under `base_url`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>, base_url: impl Into<String>) -> ObjectResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> ObjectResult<PathBuf> {
        let rel = Path::new(path);
        if path.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ObjectStoreError::Message(format!("invalid object path: {path}")));
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(
        &mut self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
        policy: UpsertPolicy,
    ) -> ObjectResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.write(true);
        match policy {
            UpsertPolicy::Overwrite => options.create(true).truncate(true),
            UpsertPolicy::Reject => options.create_new(true),
        };
        let mut file = options.open(&target).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => ObjectStoreError::AlreadyExists(path.to_string()),
            _ => ObjectStoreError::Io(err),
        })?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn remove(&mut self, path: &str) -> ObjectResult<()> {
        match fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_policy_never_overwrites() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let mut store = FsObjectStore::open(tmp.path(), "http://cdn.test/").expect("open");

        store
            .upload("lessons/1/a.txt", b"one", "text/plain", UpsertPolicy::Reject)
            .expect("first upload");
        let err = store
            .upload("lessons/1/a.txt", b"two", "text/plain", UpsertPolicy::Reject)
            .expect_err("second upload");
        assert!(matches!(err, ObjectStoreError::AlreadyExists(_)));
        store
            .upload("lessons/1/a.txt", b"three", "text/plain", UpsertPolicy::Overwrite)
            .expect("overwrite");

        let on_disk = fs::read(tmp.path().join("lessons/1/a.txt")).expect("read");
        assert_eq!(on_disk, b"three");
        assert_eq!(store.public_url("lessons/1/a.txt"), "http://cdn.test/lessons/1/a.txt");

        store.remove("lessons/1/a.txt").expect("remove");
        store.remove("lessons/1/a.txt").expect("remove twice");
    }

    #[test]
    fn escaping_paths_are_refused() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let mut store = FsObjectStore::open(tmp.path(), "http://cdn.test").expect("open");
        for bad in ["../x", "/etc/passwd", "a/../../b", ""] {
            assert!(
                store.upload(bad, b"x", "text/plain", UpsertPolicy::Overwrite).is_err(),
                "{bad}"
            );
        }
    }
}
