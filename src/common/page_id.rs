//! Page identifier type.

use std::fmt;

/// Identifies a node page on disk.
///
/// Page ids are 1-based and dense. Page `N` lives at file offset
/// `META_PAGE_SIZE + (N - 1) * PAGE_SIZE`; the meta directory occupies the
/// region before page 1 and has no id of its own.
///
/// # Example
/// ```
/// use bucketdb::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.0, 42);
/// assert!(!PageId::NONE.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// "No page": the parent of a root node, or an unset link.
    pub const NONE: PageId = PageId(0);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u64) -> Self {
        PageId(id)
    }

    /// Check if this page id names a real page.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::NONE
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            write!(f, "Page(NONE)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}
