//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array that serves as the unit of I/O
//! between disk and memory. Node pages and the meta directory both use it.

use crate::common::config::{CHECKSUM_SIZE, PAGE_SIZE};

use super::page_header::NodeHeader;

/// A page of data (4KB, 4KB-aligned).
///
/// # Memory Layout
/// - Size: 4096 bytes (4KB)
/// - Alignment: 4096 bytes
/// - Last 4 bytes: CRC32 trailer (see [`Page::update_checksum`])
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code (copying 4KB
/// should be explicit). A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use bucketdb::storage::page::Page;
///
/// let mut page = Page::new();
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Offset of the CRC32 trailer.
    pub const OFFSET_CHECKSUM: usize = PAGE_SIZE - CHECKSUM_SIZE;

    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// True if every byte is zero (a page that was never written).
    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Read the node header.
    pub fn header(&self) -> NodeHeader {
        NodeHeader::from_bytes(&self.data)
    }

    /// Write a node header.
    pub fn set_header(&mut self, header: &NodeHeader) {
        header.write_to(&mut self.data);
    }

    /// Stored checksum trailer.
    pub fn checksum(&self) -> u32 {
        let mut bytes = [0u8; CHECKSUM_SIZE];
        bytes.copy_from_slice(&self.data[Self::OFFSET_CHECKSUM..]);
        u32::from_le_bytes(bytes)
    }

    /// Compute the CRC32 of the page with the trailer treated as zero.
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; CHECKSUM_SIZE]);
        hasher.finalize()
    }

    /// Compute and store the checksum trailer.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.data[Self::OFFSET_CHECKSUM..].copy_from_slice(&checksum.to_le_bytes());
    }

    /// Verify the page checksum.
    ///
    /// A zero trailer means the page was written without a checksum and is
    /// accepted as-is.
    pub fn verify_checksum(&self) -> bool {
        let stored = self.checksum();
        stored == 0 || stored == self.compute_checksum()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}

// ============================================================================
// TESTS
// ============================================================================
