use hashbrown::HashMap;

use super::{ObjectResult, ObjectStore, ObjectStoreError, UpsertPolicy};

/// Uploaded object kept by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type given at upload.
    pub content_type: String,
}

/// Object store held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: HashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    /// Creates an empty store serving under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: HashMap::new(),
        }
    }

    /// Object stored at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&StoredObject> {
        self.objects.get(path)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing has been uploaded.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Every stored path, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://assets")
    }
}

impl ObjectStore for MemoryObjectStore {
    fn upload(
        &mut self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        policy: UpsertPolicy,
    ) -> ObjectResult<()> {
        if policy == UpsertPolicy::Reject && self.objects.contains_key(path) {
            return Err(ObjectStoreError::AlreadyExists(path.to_string()));
        }
        self.objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn remove(&mut self, path: &str) -> ObjectResult<()> {
        self.objects.remove(path);
        Ok(())
    }
}
