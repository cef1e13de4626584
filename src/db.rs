//! Database handle: one file, many buckets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::btree::{Bucket, Node, NodeKind, Tree};
use crate::common::{Config, PageId, Result};
use crate::storage::{DiskManager, MetaDirectory, StatsSnapshot};

/// State shared by the `Db` and every bucket opened from it.
///
/// # Lock order
/// bucket table -> bucket -> `store` -> `meta`
pub(crate) struct Shared {
    pub store: Mutex<DiskManager>,
    pub meta: MetaDirectory,
    pub config: Config,
}

/// An open database file.
///
/// ```text
///   Db ──► bucket table ──► Bucket ──► Tree (node cache, dirty set)
///    │                                   │
///    └──────────── Shared ◄──────────────┘
///                  ├─ Mutex<DiskManager>   page I/O
///                  ├─ MetaDirectory        allocator, free list, roots
///                  └─ Config
/// ```
///
/// Changes live in memory until [`flush`](Db::flush) (or a bucket's own
/// flush) writes them. Dropping the `Db` flushes on a best-effort basis;
/// call [`close`](Db::close) to observe errors.
pub struct Db {
    shared: Arc<Shared>,
    buckets: Mutex<HashMap<String, Bucket>>,
    path: PathBuf,
    closed: bool,
}

impl Db {
    /// Open the database at `path`, creating the file if needed.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` / `Error::CapacityExceeded` if `config`
    ///   cannot be used with the page format
    /// - `Error::CorruptedPage` if the meta directory is unreadable
    /// - `Error::Io` on file errors
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let mut store = DiskManager::open_or_create(&path, config.sync_writes)?;
        let meta = if store.is_empty()? {
            let meta = MetaDirectory::new();
            meta.persist(&mut store)?;
            meta
        } else {
            MetaDirectory::load(&mut store)?
        };

        info!(
            path = %path.display(),
            buckets = meta.bucket_names().len(),
            last_page = %meta.last_page_id(),
            "opened database"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                meta,
                config,
            }),
            buckets: Mutex::new(HashMap::new()),
            path,
            closed: false,
        })
    }

    /// Handle to the bucket `name`, creating it on first use.
    ///
    /// Every call with the same name returns a handle to the same working
    /// set.
    ///
    /// # Errors
    /// - `Error::InvalidBucketName` for an empty name or one containing NUL
    /// - `Error::CapacityExceeded` if the name is too long or the directory
    ///   is full
    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(name) {
            return Ok(bucket.clone());
        }

        let (root, created) = self.shared.meta.resolve_or_create(name)?;
        if created {
            if let Err(err) = self.write_new_root(root) {
                self.shared.meta.discard_bucket(name);
                warn!(bucket = name, error = %err, "bucket creation rolled back");
                return Err(err);
            }
            info!(bucket = name, root = %root, "created bucket");
        }

        let bucket = Bucket::new(Tree::new(name.to_owned(), root, Arc::clone(&self.shared)));
        buckets.insert(name.to_owned(), bucket.clone());
        Ok(bucket)
    }

    fn write_new_root(&self, root: PageId) -> Result<()> {
        let page = Node::new(root, NodeKind::Leaf, PageId::NONE).encode(self.shared.config.value_size)?;
        let mut store = self.shared.store.lock();
        store.write_page(root, &page)?;
        self.shared.meta.persist(&mut store)?;
        Ok(())
    }

    /// Names of every bucket in the file, in creation order.
    pub fn bucket_names(&self) -> Vec<String> {
        self.shared.meta.bucket_names()
    }

    /// Page ids waiting for reuse, in reuse order.
    pub fn free_pages(&self) -> Vec<PageId> {
        self.shared.meta.free_pages()
    }

    /// Page store I/O counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.store.lock().stats().snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush every open bucket, then the meta directory.
    pub fn flush(&self) -> Result<()> {
        let buckets = self.buckets.lock();
        for bucket in buckets.values() {
            bucket.flush()?;
        }
        let mut store = self.shared.store.lock();
        self.shared.meta.persist(&mut store)?;
        Ok(())
    }

    /// Flush and fsync, then close the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.shared.store.lock().sync()?;
        self.closed = true;
        info!(path = %self.path.display(), "closed database");
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "flush on drop failed");
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("config", &self.shared.config)
            .finish()
    }
}
