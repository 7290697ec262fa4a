//! In-process object store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{MailslotError, Result};
use crate::store::ObjectStore;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Objects kept in a sorted map behind a mutex. Nothing survives the process.
///
/// [`MemoryStore::set_unavailable`] makes every call fail as an outage
/// would, and [`MemoryStore::set_read_only`] fails only writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    unavailable: AtomicBool,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate (or end) an outage: while set, every operation returns a storage error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While set, reads succeed and `put`/`delete` return a storage error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Content type an object was written with.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock(key)
            .ok()?
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self, key: &str) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MailslotError::storage(key, "store unavailable"));
        }
        self.objects
            .lock()
            .map_err(|_| MailslotError::storage(key, "store lock poisoned"))
    }

    fn lock_for_write(&self, key: &str) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(MailslotError::storage(key, "store rejected write"));
        }
        self.lock(key)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock(key)?.get(key).map(|o| o.bytes.clone()))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.lock_for_write(key)?.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock_for_write(key)?.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock(prefix)?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.put("a", b"one", "text/plain").unwrap();
        store.put("a", b"two", "text/plain").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"two".to_vec()));
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_prefix() {
        let store = MemoryStore::new();
        for key in ["d/s/messages/2.json", "d/s/meta.json", "d/s/messages/1.json", "d/t/meta.json"] {
            store.put(key, b"{}", "application/json").unwrap();
        }
        assert_eq!(
            store.list("d/s/messages/").unwrap(),
            vec!["d/s/messages/1.json", "d/s/messages/2.json"]
        );
        assert_eq!(store.list("d/").unwrap().len(), 4);
    }

    #[test]
    fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.get("a").unwrap_err();
        assert!(err.is_transient());
        store.set_unavailable(false);
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_read_only_fails_writes_only() {
        let store = MemoryStore::new();
        store.put("a", b"one", "text/plain").unwrap();
        store.set_read_only(true);
        assert_eq!(store.get("a").unwrap(), Some(b"one".to_vec()));
        assert!(store.put("b", b"two", "text/plain").unwrap_err().is_transient());
        assert!(store.delete("a").is_err());
        assert_eq!(store.len(), 1);
        store.set_read_only(false);
        store.put("b", b"two", "text/plain").unwrap();
        assert_eq!(store.len(), 2);
    }
}
