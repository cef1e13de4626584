//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing node pages by id
//! - Reading and writing the meta directory region
//! - Managing the database file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::common::config::{META_PAGE_SIZE, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::IoStats;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │  Meta    │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │  (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...   4096 + (N-1)×4096
/// ```
///
/// Page N is located at file offset `META_PAGE_SIZE + (N - 1) × PAGE_SIZE`.
/// Page ids are handed out by the [`MetaDirectory`](super::MetaDirectory);
/// the file grows the first time a page is written.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The [`Db`](crate::Db) keeps it
/// behind a mutex.
///
/// # Durability
/// With `sync_writes` on, every write is followed by `fsync()`.
pub struct DiskManager {
    file: File,
    sync_writes: bool,
    stats: IoStats,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self::from_file(file, sync_writes))
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_file(file, sync_writes))
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P, sync_writes: bool) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, sync_writes)
        } else {
            Self::create(path, sync_writes)
        }
    }

    fn from_file(file: File, sync_writes: bool) -> Self {
        Self {
            file,
            sync_writes,
            stats: IoStats::new(),
        }
    }

    /// File offset of a node page.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for `PageId::NONE`.
    pub fn page_offset(page_id: PageId) -> Result<u64> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        (page_id.0 - 1)
            .checked_mul(PAGE_SIZE as u64)
            .and_then(|off| off.checked_add(META_PAGE_SIZE as u64))
            .ok_or(Error::InvalidPageId(page_id.0))
    }

    /// Read a node page from disk.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for page 0
    /// - `Error::Io` on seek failure or short read (e.g. past end of file)
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let offset = Self::page_offset(page_id)?;
        let page = self.read_at(offset)?;
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);
        Ok(page)
    }

    /// Write a node page to disk, extending the file if needed.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for page 0
    /// - `Error::Io` on seek failure or partial write
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = Self::page_offset(page_id)?;
        self.write_at(offset, page)?;
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Read the meta directory region.
    pub fn read_meta(&mut self) -> Result<Page> {
        self.read_at(0)
    }

    /// Write the meta directory region.
    pub fn write_meta(&mut self, page: &Page) -> Result<()> {
        self.write_at(0, page)?;
        self.stats.meta_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.stats.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Get the total size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// True if nothing has been written to the file yet.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.file_size()? == 0)
    }

    /// I/O counters.
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    fn read_at(&mut self, offset: u64) -> Result<Page> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    fn write_at(&mut self, offset: u64, page: &Page) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        if self.sync_writes {
            self.sync()?;
        }
        Ok(())
    }
}
