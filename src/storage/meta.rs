//! Meta Directory - allocator state and the bucket table.
//!
//! The [`MetaDirectory`] lives in the first page of the file. It records:
//! - the highest page id handed out so far
//! - the FIFO free list of reclaimed page ids
//! - every bucket's name and root page id
//!
//! Root changes and freed pages are tracked per bucket and only reach the
//! page when that bucket flushes, so the directory on disk never names a
//! node page its bucket has not written yet.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::common::config::{BUCKET_NAME_SIZE, CHECKSUM_SIZE, META_PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// One entry of the bucket table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BucketRecord {
    name: String,
    /// Root of the in-memory tree.
    root: PageId,
    /// Root as of the bucket's last flush. This is what the page records.
    durable_root: PageId,
    /// Pages the bucket released since its last flush. Its on-disk tree
    /// may still reference them, so they are not reusable yet.
    pending_free: Vec<PageId>,
}

impl BucketRecord {
    fn new(name: &str, root: PageId) -> Self {
        Self {
            name: name.to_string(),
            root,
            durable_root: root,
            pending_free: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MetaState {
    last_page_id: u64,
    free_list: VecDeque<PageId>,
    buckets: Vec<BucketRecord>,
    dirty: bool,
}

/// Allocator state and bucket directory, shared by every bucket of a
/// [`Db`](crate::Db).
///
/// # Layout
/// ```text
/// Offset          Size   Field
/// ------          ----   -----
/// 0               8      last_page_id (little-endian)
/// 8               8      bucket_count
/// 16              108×n  bucket records: 100-byte NUL-padded name, u64 root
/// 16 + 108×n      8      free_count
/// 24 + 108×n      8×f    free page ids, FIFO order
/// 4092            4      CRC32 trailer
/// ```
///
/// Bucket records are written with the root of the bucket's last flush.
/// The free list holds only pages whose owning bucket has flushed since
/// releasing them.
///
/// # Thread Safety
/// All state sits behind one `parking_lot::Mutex`; allocation and
/// reclamation are atomic with respect to each other.
pub struct MetaDirectory {
    state: Mutex<MetaState>,
}

impl MetaDirectory {
    pub const OFFSET_LAST_PAGE_ID: usize = 0;
    pub const OFFSET_BUCKET_COUNT: usize = 8;
    pub const OFFSET_RECORDS: usize = 16;

    /// Name followed by root page id.
    pub const RECORD_SIZE: usize = BUCKET_NAME_SIZE + 8;

    /// Bytes usable before the checksum trailer.
    const USABLE: usize = META_PAGE_SIZE - CHECKSUM_SIZE;

    /// Most buckets a directory page can describe (with an empty free list).
    pub const MAX_BUCKETS: usize = (Self::USABLE - Self::OFFSET_RECORDS - 8) / Self::RECORD_SIZE;

    /// Create an empty directory for a fresh file.
    ///
    /// The directory starts dirty so the first `persist` writes it out.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetaState {
                dirty: true,
                ..MetaState::default()
            }),
        }
    }

    /// Read the directory from the start of the file.
    pub fn load(store: &mut DiskManager) -> Result<Self> {
        let page = store.read_meta()?;
        Self::decode(&page)
    }

    /// Write the directory page if anything changed since the last write.
    ///
    /// Returns `true` if a write happened.
    pub fn persist(&self, store: &mut DiskManager) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(false);
        }
        let page = Self::encode_state(&state);
        store.write_meta(&page)?;
        state.dirty = false;
        Ok(true)
    }

    // ========================================================================
    // Page-id allocation
    // ========================================================================

    /// Hand out `count` page ids, or none at all. Each comes from the
    /// free-list head if any, else from the id counter.
    ///
    /// # Errors
    /// `Error::CapacityExceeded` if the free list and the remaining id space
    /// together cannot supply `count` ids. Nothing is allocated then.
    pub fn allocate_many(&self, count: usize) -> Result<Vec<PageId>> {
        let mut state = self.state.lock();
        let fresh = u64::MAX - state.last_page_id;
        let available = (state.free_list.len() as u64).saturating_add(fresh);
        if count as u64 > available {
            return Err(Error::CapacityExceeded {
                what: "page id space",
                size: count,
                max: usize::try_from(available).unwrap_or(usize::MAX),
            });
        }
        (0..count).map(|_| Self::allocate_locked(&mut state)).collect()
    }

    fn allocate_locked(state: &mut MetaState) -> Result<PageId> {
        state.dirty = true;

        if let Some(page_id) = state.free_list.pop_front() {
            trace!(page_id = page_id.0, "reusing free page");
            return Ok(page_id);
        }

        let next = state
            .last_page_id
            .checked_add(1)
            .ok_or(Error::CapacityExceeded {
                what: "page id space",
                size: usize::MAX,
                max: usize::MAX,
            })?;
        state.last_page_id = next;
        trace!(page_id = next, "allocated new page");
        Ok(PageId::new(next))
    }

    /// Record that `bucket` released `page_id`.
    ///
    /// The id joins the free list when the bucket next [commits](Self::commit).
    ///
    /// # Errors
    /// `Error::InvalidBucketName` if the bucket does not exist.
    pub fn free(&self, bucket: &str, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        trace!(bucket, page_id = page_id.0, "page released");
        Self::record_mut(&mut state, bucket)?
            .pending_free
            .push(page_id);
        Ok(())
    }

    /// Publish a bucket's state after its node pages have been written:
    /// its current root becomes the recorded root and the pages it
    /// released become reusable.
    ///
    /// # Errors
    /// `Error::InvalidBucketName` if the bucket does not exist.
    pub fn commit(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock();
        let record = Self::record_mut(&mut state, bucket)?;
        let changed = record.durable_root != record.root || !record.pending_free.is_empty();
        record.durable_root = record.root;
        let released = std::mem::take(&mut record.pending_free);
        if changed {
            trace!(bucket, released = released.len(), "bucket committed");
            state.free_list.extend(released);
            state.dirty = true;
        }
        Ok(())
    }

    /// Reusable page ids, in reuse order.
    pub fn free_pages(&self) -> Vec<PageId> {
        self.state.lock().free_list.iter().copied().collect()
    }

    /// Highest page id handed out so far.
    pub fn last_page_id(&self) -> PageId {
        PageId::new(self.state.lock().last_page_id)
    }

    /// True if the in-memory directory differs from the one on disk.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    // ========================================================================
    // Bucket table
    // ========================================================================

    /// Look up a bucket root, creating the bucket on a miss.
    ///
    /// On creation a fresh page id is allocated for the root. The caller is
    /// responsible for writing an empty leaf there and persisting the
    /// directory.
    ///
    /// # Errors
    /// - `Error::InvalidBucketName` for empty names or names containing NUL
    /// - `Error::CapacityExceeded` if the name or the table is too large
    pub fn resolve_or_create(&self, name: &str) -> Result<(PageId, bool)> {
        validate_bucket_name(name)?;

        let mut state = self.state.lock();
        if let Some(record) = state.buckets.iter().find(|r| r.name == name) {
            return Ok((record.root, false));
        }

        if state.buckets.len() >= Self::MAX_BUCKETS {
            return Err(Error::CapacityExceeded {
                what: "bucket directory",
                size: state.buckets.len() + 1,
                max: Self::MAX_BUCKETS,
            });
        }

        let root = Self::allocate_locked(&mut state)?;
        state.buckets.push(BucketRecord::new(name, root));
        Ok((root, true))
    }

    /// Undo a `resolve_or_create` whose root page could not be written.
    ///
    /// The entry is removed and its root id goes back to the free list.
    pub fn discard_bucket(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(index) = state.buckets.iter().position(|r| r.name == name) {
            let record = state.buckets.remove(index);
            state.free_list.push_front(record.root);
            state.dirty = true;
        }
    }

    /// Current root of a bucket, if it exists.
    pub fn root_of(&self, name: &str) -> Option<PageId> {
        self.state
            .lock()
            .buckets
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.root)
    }

    /// Point a bucket at a new root page.
    ///
    /// # Errors
    /// `Error::InvalidBucketName` if the bucket does not exist.
    ///
    /// The directory page keeps the old root until the bucket commits.
    pub fn set_root(&self, name: &str, root: PageId) -> Result<()> {
        let mut state = self.state.lock();
        Self::record_mut(&mut state, name)?.root = root;
        Ok(())
    }

    fn record_mut<'a>(state: &'a mut MetaState, name: &str) -> Result<&'a mut BucketRecord> {
        state
            .buckets
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::InvalidBucketName(name.to_string()))
    }

    /// Names of all buckets, in creation order.
    pub fn bucket_names(&self) -> Vec<String> {
        self.state
            .lock()
            .buckets
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Serialize the directory into a page.
    pub fn encode(&self) -> Page {
        Self::encode_state(&self.state.lock())
    }

    fn encode_state(state: &MetaState) -> Page {
        let mut page = Page::new();
        let data = page.as_mut_slice();

        write_u64(data, Self::OFFSET_LAST_PAGE_ID, state.last_page_id);
        write_u64(data, Self::OFFSET_BUCKET_COUNT, state.buckets.len() as u64);

        let mut offset = Self::OFFSET_RECORDS;
        for record in &state.buckets {
            let name = record.name.as_bytes();
            data[offset..offset + name.len()].copy_from_slice(name);
            offset += BUCKET_NAME_SIZE;
            write_u64(data, offset, record.durable_root.0);
            offset += 8;
        }

        let free_capacity = (Self::USABLE - offset - 8) / 8;
        let persisted = state.free_list.len().min(free_capacity);
        if persisted < state.free_list.len() {
            warn!(
                free_pages = state.free_list.len(),
                persisted, "free list does not fit the meta page, tail pages leak"
            );
        }

        write_u64(data, offset, persisted as u64);
        offset += 8;
        for page_id in state.free_list.iter().take(persisted) {
            write_u64(data, offset, page_id.0);
            offset += 8;
        }

        page.update_checksum();
        page
    }

    /// Parse a directory page.
    ///
    /// # Errors
    /// `Error::CorruptedPage` (page 0) on checksum mismatch or impossible
    /// counts.
    pub fn decode(page: &Page) -> Result<Self> {
        let meta_page = PageId::NONE;
        if !page.verify_checksum() {
            return Err(Error::corrupted_page(meta_page, "meta checksum mismatch"));
        }

        let data = page.as_slice();
        let last_page_id = read_u64(data, Self::OFFSET_LAST_PAGE_ID);
        let bucket_count = read_u64(data, Self::OFFSET_BUCKET_COUNT) as usize;
        if bucket_count > Self::MAX_BUCKETS {
            return Err(Error::corrupted_page(
                meta_page,
                format!("bucket count {} exceeds {}", bucket_count, Self::MAX_BUCKETS),
            ));
        }

        let mut buckets = Vec::with_capacity(bucket_count);
        let mut offset = Self::OFFSET_RECORDS;
        for _ in 0..bucket_count {
            let raw = &data[offset..offset + BUCKET_NAME_SIZE];
            let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            let name = String::from_utf8(raw[..end].to_vec())
                .map_err(|_| Error::corrupted_page(meta_page, "bucket name is not UTF-8"))?;
            offset += BUCKET_NAME_SIZE;

            let root = PageId::new(read_u64(data, offset));
            offset += 8;
            if !root.is_valid() || root.0 > last_page_id {
                return Err(Error::corrupted_page(
                    meta_page,
                    format!("bucket {:?} has invalid root {}", name, root),
                ));
            }
            buckets.push(BucketRecord::new(&name, root));
        }

        let free_count = read_u64(data, offset) as usize;
        offset += 8;
        let free_capacity = (Self::USABLE - offset) / 8;
        if free_count > free_capacity {
            return Err(Error::corrupted_page(
                meta_page,
                format!("free count {} exceeds {}", free_count, free_capacity),
            ));
        }

        let mut free_list = VecDeque::with_capacity(free_count);
        for _ in 0..free_count {
            let page_id = PageId::new(read_u64(data, offset));
            offset += 8;
            if !page_id.is_valid() || page_id.0 > last_page_id {
                return Err(Error::corrupted_page(
                    meta_page,
                    format!("free list holds invalid {}", page_id),
                ));
            }
            free_list.push_back(page_id);
        }

        Ok(Self {
            state: Mutex::new(MetaState {
                last_page_id,
                free_list,
                buckets,
                dirty: false,
            }),
        })
    }
}

impl Default for MetaDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bucket_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidBucketName(name.to_string()));
    }
    if name.len() > BUCKET_NAME_SIZE {
        return Err(Error::CapacityExceeded {
            what: "bucket name",
            size: name.len(),
            max: BUCKET_NAME_SIZE,
        });
    }
    Ok(())
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
