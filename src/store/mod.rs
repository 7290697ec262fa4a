//! Object storage: a flat key space of byte blobs addressed by `/`-separated keys.
//!
//! The ingestion pipeline and inbox operations only ever talk to
//! [`ObjectStore`]; the concrete backend is chosen once at startup
//! ([`Backend::from_config`]) and passed in.

pub mod filesystem;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{self, BackendKind, Config};
use crate::error::Result;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Content type used for every JSON object we write.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Marks the names of in-flight temporary files. Never part of a key.
pub(crate) const TMP_MARKER: &str = ".tmp-";

/// Whether `segment` may appear between the `/`s of a key on every backend.
pub fn is_key_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
        && !segment.contains(TMP_MARKER)
}

/// Get/put/delete/list over string keys.
///
/// A single `put` is atomic: readers see either the old object or the
/// new one, never a partial write.
pub trait ObjectStore {
    /// Read an object. `Ok(None)` means it does not exist; `Err` is a
    /// failure of the store itself.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an object.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Remove an object. Removing a missing object succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        (**self).put(key, bytes, content_type)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }
}

/// Read and deserialize a JSON object.
pub fn get_json<T: DeserializeOwned>(store: &impl ObjectStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize (pretty-printed) and write a JSON object.
pub fn put_json<T: Serialize>(store: &impl ObjectStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(key, &bytes, JSON_CONTENT_TYPE)
}

/// The storage backend selected at startup.
pub enum Backend {
    Memory(MemoryStore),
    Filesystem(FilesystemStore),
}

impl Backend {
    /// Build the backend named in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.storage.backend {
            BackendKind::Memory => Ok(Self::Memory(MemoryStore::new())),
            BackendKind::Filesystem => Ok(Self::Filesystem(FilesystemStore::open(
                config::storage_root(config),
            )?)),
        }
    }

    fn inner(&self) -> &dyn ObjectStore {
        match self {
            Self::Memory(s) => s,
            Self::Filesystem(s) => s,
        }
    }
}

impl ObjectStore for Backend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner().get(key)
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.inner().put(key, bytes, content_type)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner().delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner().list(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_helpers_roundtrip_through_store() {
        let store = MemoryStore::new();
        put_json(&store, "a/b.json", &serde_json::json!({"k": 1})).unwrap();
        let value: serde_json::Value = get_json(&store, "a/b.json").unwrap().unwrap();
        assert_eq!(value["k"], 1);
        assert_eq!(store.content_type("a/b.json").as_deref(), Some(JSON_CONTENT_TYPE));
        assert!(get_json::<serde_json::Value>(&store, "missing").unwrap().is_none());
    }

    #[test]
    fn test_backend_from_config() {
        let mut cfg = Config::default();
        cfg.storage.backend = BackendKind::Memory;
        let backend = Backend::from_config(&cfg).unwrap();
        backend.put("x", b"1", "text/plain").unwrap();
        assert_eq!(backend.get("x").unwrap(), Some(b"1".to_vec()));
        assert!(matches!(backend, Backend::Memory(_)));
    }
}
