//! Public bucket handle.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::btree::node::trim_nul;
use crate::btree::tree::Tree;
use crate::common::config::KEY_SIZE;
use crate::common::{Error, PageId, Result};

/// A named key/value namespace backed by its own B+ tree.
///
/// Keys and values are byte strings. Keys live in fixed-width NUL-padded
/// slots, so trailing NUL bytes of a key are not significant: `b"a\0"`
/// and `b"a"` are the same key. Values carry their length and come back
/// byte for byte.
///
/// Handles are cheap to clone and share one working set. Writers
/// (`put`, `update`, `delete`, `flush`) are serialized; readers run
/// concurrently with each other.
///
/// # Example
/// ```no_run
/// use bucketdb::{Config, Db};
///
/// let db = Db::open("countries.db", Config::default())?;
/// let bucket = db.bucket("capitals")?;
/// bucket.put(b"Egypt", b"Cairo")?;
/// assert_eq!(bucket.get(b"Egypt")?, b"Cairo");
/// # Ok::<(), bucketdb::Error>(())
/// ```
#[derive(Clone)]
pub struct Bucket {
    inner: Arc<RwLock<Tree>>,
}

impl Bucket {
    pub(crate) fn new(tree: Tree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Bucket name.
    pub fn name(&self) -> String {
        self.inner.read().name().to_owned()
    }

    /// Insert `key`, or overwrite its value if present.
    ///
    /// # Errors
    /// - `Error::EmptyKey` for an empty key
    /// - `Error::CapacityExceeded` if the key or value is wider than its slot
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut tree = self.inner.write();
        let key = normalize_key(key)?;
        let value = normalize_value(value, tree.value_size())?;
        tree.put(key.to_vec(), value.to_vec())?;
        Ok(())
    }

    /// Overwrite the value of an existing key.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if the key is absent, plus the input errors of
    /// [`put`](Self::put).
    pub fn update(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut tree = self.inner.write();
        let key = normalize_key(key)?;
        let value = normalize_value(value, tree.value_size())?;
        tree.update(key, value.to_vec())
    }

    /// Value stored under `key`.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let key = normalize_key(key)?;
        self.inner.read().get(key)?.ok_or(Error::KeyNotFound)
    }

    /// True if `key` is present.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let key = normalize_key(key)?;
        Ok(self.inner.read().get(key)?.is_some())
    }

    /// Remove `key`.
    ///
    /// A leaf left empty is unlinked from its parent and its page goes to
    /// the free list, unless it is the root or its parent's only child.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if the key is absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let key = normalize_key(key)?;
        self.inner.write().delete(key)
    }

    /// Visit entries in ascending key order until `visit` returns `false`.
    pub fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.inner.read().scan(&mut visit)
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        self.scan(|k, v| {
            entries.push((k.to_vec(), v.to_vec()));
            true
        })?;
        Ok(entries)
    }

    /// Number of entries. Walks the whole tree.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        self.scan(|_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let mut empty = true;
        self.scan(|_, _| {
            empty = false;
            false
        })?;
        Ok(empty)
    }

    /// Write modified nodes and the meta directory to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.write().flush().map(|_| ())
    }

    /// Nodes modified since the last flush.
    pub fn dirty_pages(&self) -> usize {
        self.inner.read().dirty_count()
    }

    /// Page id of the root node.
    pub fn root(&self) -> PageId {
        self.inner.read().root()
    }

    /// Number of levels, root and leaves included.
    pub fn height(&self) -> Result<usize> {
        self.inner.read().height()
    }

    /// Check ordering, fan-out, key ranges, parent links and leaf depth of
    /// the whole tree.
    ///
    /// # Errors
    /// `Error::CorruptedTree` naming the first offending page.
    pub fn verify(&self) -> Result<()> {
        self.inner.read().verify()
    }

    /// Render the tree as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> Result<String> {
        self.inner.read().to_mermaid()
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.inner.read();
        f.debug_struct("Bucket")
            .field("name", &tree.name())
            .field("root", &tree.root())
            .finish()
    }
}

fn normalize_key(key: &[u8]) -> Result<&[u8]> {
    let key = trim_nul(key);
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    if key.len() > KEY_SIZE {
        return Err(Error::CapacityExceeded {
            what: "key",
            size: key.len(),
            max: KEY_SIZE,
        });
    }
    Ok(key)
}

fn normalize_value(value: &[u8], value_size: usize) -> Result<&[u8]> {
    if value.len() > value_size {
        return Err(Error::CapacityExceeded {
            what: "value",
            size: value.len(),
            max: value_size,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Db};
    use tempfile::tempdir;

    fn open(max_keys: usize) -> (tempfile::TempDir, Db) {
        let dir = tempdir().unwrap();
        let config = Config::default()
            .max_keys_per_node(max_keys)
            .sync_writes(false);
        let db = Db::open(dir.path().join("bucket.db"), config).unwrap();
        (dir, db)
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(b"abc\0\0").unwrap(), b"abc");
        assert!(matches!(normalize_key(b""), Err(Error::EmptyKey)));
        assert!(matches!(normalize_key(b"\0\0"), Err(Error::EmptyKey)));
        assert!(normalize_key(&[b'k'; KEY_SIZE]).is_ok());
        assert!(matches!(
            normalize_key(&[b'k'; KEY_SIZE + 1]),
            Err(Error::CapacityExceeded { what: "key", .. })
        ));
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value(b"v\0", 4).unwrap(), b"v\0");
        assert_eq!(normalize_value(b"", 4).unwrap(), b"");
        assert!(matches!(
            normalize_value(b"12345", 4),
            Err(Error::CapacityExceeded { what: "value", size: 5, max: 4 })
        ));
    }

    #[test]
    fn test_put_get() {
        let (_dir, db) = open(3);
        let bucket = db.bucket("users").unwrap();

        bucket.put(b"name", b"Ahmed").unwrap();
        bucket.put(b"age", b"32").unwrap();

        assert_eq!(bucket.get(b"name").unwrap(), b"Ahmed");
        assert_eq!(bucket.get(b"age").unwrap(), b"32");
        assert!(matches!(bucket.get(b"missing"), Err(Error::KeyNotFound)));
        assert_eq!(bucket.name(), "users");
    }

    #[test]
    fn test_trailing_nuls_only_trimmed_from_keys() {
        let (_dir, db) = open(3);
        let bucket = db.bucket("b").unwrap();

        bucket.put(b"key\0\0", b"value\0").unwrap();
        assert_eq!(bucket.get(b"key").unwrap(), b"value\0");
        assert!(bucket.contains(b"key\0").unwrap());
    }

    #[test]
    fn test_value_with_trailing_zeros_survives_flush() {
        let (_dir, db) = open(3);
        let bucket = db.bucket("b").unwrap();

        bucket.put(b"n", &42u32.to_le_bytes()).unwrap();
        bucket.put(b"z", &[0, 0]).unwrap();
        bucket.flush().unwrap();
        drop(bucket);
        let path = db.path().to_owned();
        db.close().unwrap();

        let db = Db::open(path, Config::default().sync_writes(false)).unwrap();
        let bucket = db.bucket("b").unwrap();
        assert_eq!(bucket.get(b"n").unwrap(), vec![42, 0, 0, 0]);
        assert_eq!(bucket.get(b"z").unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_update_requires_existing_key() {
        let (_dir, db) = open(3);
        let bucket = db.bucket("b").unwrap();

        assert!(matches!(bucket.update(b"k", b"v"), Err(Error::KeyNotFound)));
        bucket.put(b"k", b"v1").unwrap();
        bucket.update(b"k", b"v2").unwrap();
        assert_eq!(bucket.get(b"k").unwrap(), b"v2");
        assert_eq!(bucket.len().unwrap(), 1);
    }

    #[test]
    fn test_rejected_input_leaves_bucket_untouched() {
        let (_dir, db) = open(3);
        let bucket = db.bucket("b").unwrap();
        bucket.flush().unwrap();

        assert!(bucket.put(b"", b"v").is_err());
        assert!(bucket.put(b"k", &[1u8; 1001]).is_err());
        assert_eq!(bucket.dirty_pages(), 0);
        assert!(bucket.is_empty().unwrap());
    }

    #[test]
    fn test_clones_share_working_set() {
        let (_dir, db) = open(3);
        let a = db.bucket("shared").unwrap();
        let b = a.clone();

        a.put(b"k", b"v").unwrap();
        assert_eq!(b.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn test_scan_stops_early() {
        let (_dir, db) = open(2);
        let bucket = db.bucket("b").unwrap();
        for k in ["e", "a", "d", "b", "c"] {
            bucket.put(k.as_bytes(), b"v").unwrap();
        }

        let mut seen = Vec::new();
        bucket
            .scan(|k, _| {
                seen.push(k.to_vec());
                seen.len() < 3
            })
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_mermaid_lists_every_page() {
        let (_dir, db) = open(2);
        let bucket = db.bucket("b").unwrap();
        for k in ["a", "b", "c"] {
            bucket.put(k.as_bytes(), b"v").unwrap();
        }

        let chart = bucket.to_mermaid().unwrap();
        assert!(chart.starts_with("graph TD;\n"));
        let root = bucket.root().0;
        assert!(chart.contains(&format!("P{}[", root)));
        assert_eq!(chart.matches(" --> ").count(), 2);
    }
}
