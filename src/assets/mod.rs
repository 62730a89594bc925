/// Directory-backed object store.
pub mod fs;
/// Inline payload decoding, path building, upload.
pub mod materialize;
/// In-process object store.
pub mod memory;

/// Failure reported by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// Filesystem failure.
    #[error("object store io: {0}")]
    Io(#[from] std::io::Error),
    /// [`UpsertPolicy::Reject`] hit an existing object.
    #[error("object already exists at {0}")]
    AlreadyExists(String),
    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for object store calls.
pub type ObjectResult<T> = Result<T, ObjectStoreError>;

/// What an upload does when the path is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Replace existing bytes. Used for deterministic cover paths.
    Overwrite,
    /// Fail instead of replacing. Used for resource files.
    Reject,
}

/// Binary object storage collaborator.
pub trait ObjectStore: Send {
    /// Stores `bytes` at `path`, honoring `policy`.
    fn upload(
        &mut self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        policy: UpsertPolicy,
    ) -> ObjectResult<()>;

    /// Public URL under which `path` is served.
    fn public_url(&self, path: &str) -> String;

    /// Removes an object. Missing objects are not an error.
    fn remove(&mut self, _path: &str) -> ObjectResult<()> {
        Ok(())
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn upload(
        &mut self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        policy: UpsertPolicy,
    ) -> ObjectResult<()> {
        (**self).upload(path, bytes, content_type, policy)
    }

    fn public_url(&self, path: &str) -> String {
        (**self).public_url(path)
    }

    fn remove(&mut self, path: &str) -> ObjectResult<()> {
        (**self).remove(path)
    }
}
