//! Object store backed by a directory tree.
//!
//! Key `a/b/c.json` lives at `<root>/a/b/c.json`. Content types are not
//! persisted. Writes go to a temporary sibling and are renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{MailslotError, Result};
use crate::store::{is_key_segment, ObjectStore, TMP_MARKER};

/// Objects stored as files under a root directory.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| MailslotError::io(&root, e))?;
        debug!(root = %root.display(), "Opened filesystem store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path below the root, rejecting anything that could escape it.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if !is_key_segment(segment) {
                return Err(MailslotError::InvalidKey(key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Collect keys of all files below `dir` into `out`.
    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MailslotError::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| MailslotError::io(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| MailslotError::io(&path, e))?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if file_type.is_file() {
                if let Some(key) = self.path_key(&path) {
                    out.push(key);
                }
            }
        }
        Ok(())
    }

    fn path_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        let key = segments.join("/");
        if key.contains(TMP_MARKER) {
            return None;
        }
        Some(key)
    }
}

impl ObjectStore for FilesystemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MailslotError::storage(key, e)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MailslotError::storage(key, e))?;
        }

        let suffix: u32 = rand::rng().random();
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(format!("{TMP_MARKER}{suffix:08x}"));
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, bytes).map_err(|e| MailslotError::storage(key, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
            }
            return Err(MailslotError::storage(key, e));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MailslotError::storage(key, e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the deepest directory the prefix pins down.
        let start = match prefix.rfind('/') {
            Some(pos) => self.key_path(&prefix[..pos])?,
            None => self.root.clone(),
        };
        let mut keys = Vec::new();
        self.walk(&start, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_nested() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path()).unwrap();
        store
            .put("d.email/box/messages/1.json", b"{}", "application/json")
            .unwrap();
        assert_eq!(
            store.get("d.email/box/messages/1.json").unwrap(),
            Some(b"{}".to_vec())
        );
        assert!(dir.path().join("d.email/box/messages/1.json").exists());
        assert_eq!(store.get("d.email/box/meta.json").unwrap(), None);
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path()).unwrap();
        store.put("d/s/meta.json", b"m", "application/json").unwrap();
        store.put("d/s/messages/b.json", b"b", "application/json").unwrap();
        store.put("d/s/messages/a.json", b"a", "application/json").unwrap();
        assert_eq!(
            store.list("d/s/messages/").unwrap(),
            vec!["d/s/messages/a.json", "d/s/messages/b.json"]
        );
        assert!(store.list("d/zzz/").unwrap().is_empty());
        store.delete("d/s/messages/a.json").unwrap();
        store.delete("d/s/messages/a.json").unwrap();
        assert_eq!(store.list("d/s/").unwrap(), vec!["d/s/messages/b.json", "d/s/meta.json"]);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path()).unwrap();
        for key in ["../x", "a//b", "/abs", "a/./b", ""] {
            assert!(
                matches!(store.get(key), Err(MailslotError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path()).unwrap();
        store.put("k/v.json", b"1", "application/json").unwrap();
        store.put("k/v.json", b"2", "application/json").unwrap();
        assert_eq!(store.get("k/v.json").unwrap(), Some(b"2".to_vec()));
        let names: Vec<_> = fs::read_dir(dir.path().join("k")).unwrap().collect();
        assert_eq!(names.len(), 1);
    }
}
