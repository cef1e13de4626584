//! Node page header and type definitions.
//!
//! Every node page starts with a [`NodeHeader`]:
//! - page id (repeated for integrity checks)
//! - [`PageType`] discriminator
//! - key count

/// Type of node page stored on disk.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Never written (all-zero page) or unknown.
    #[default]
    Invalid = 0,
    /// B+ tree internal node.
    Internal = 1,
    /// B+ tree leaf node.
    Leaf = 2,
}

impl PageType {
    /// Convert from u8, returning Invalid for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PageType::Internal,
            2 => PageType::Leaf,
            _ => PageType::Invalid,
        }
    }
}

/// Metadata stored at the beginning of every node page.
///
/// # Layout (13 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     page_id (little-endian)
/// 8       1     page_type (PageType as u8)
/// 9       4     key_count (little-endian)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Id of the page this header was written to.
    pub page_id: u64,
    /// Type of this page.
    pub page_type: PageType,
    /// Number of keys stored after the header.
    pub key_count: u32,
}

impl NodeHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = crate::common::config::NODE_HEADER_SIZE;

    pub const OFFSET_PAGE_ID: usize = 0;
    pub const OFFSET_PAGE_TYPE: usize = 8;
    pub const OFFSET_KEY_COUNT: usize = 9;

    /// Create a new header.
    pub fn new(page_id: u64, page_type: PageType, key_count: u32) -> Self {
        Self {
            page_id,
            page_type,
            key_count,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        let mut page_id = [0u8; 8];
        page_id.copy_from_slice(&data[Self::OFFSET_PAGE_ID..Self::OFFSET_PAGE_ID + 8]);

        let mut key_count = [0u8; 4];
        key_count.copy_from_slice(&data[Self::OFFSET_KEY_COUNT..Self::OFFSET_KEY_COUNT + 4]);

        Self {
            page_id: u64::from_le_bytes(page_id),
            page_type: PageType::from_u8(data[Self::OFFSET_PAGE_TYPE]),
            key_count: u32::from_le_bytes(key_count),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        data[Self::OFFSET_PAGE_ID..Self::OFFSET_PAGE_ID + 8]
            .copy_from_slice(&self.page_id.to_le_bytes());
        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::OFFSET_KEY_COUNT..Self::OFFSET_KEY_COUNT + 4]
            .copy_from_slice(&self.key_count.to_le_bytes());
    }
}

// ============================================================================
// TESTS
// ============================================================================
