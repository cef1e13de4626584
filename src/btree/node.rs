//! In-memory B+ tree node and its page codec.
//!
//! A [`Node`] is the working copy of one node page. Nodes reference their
//! parent and children by [`PageId`]; the bucket's node cache resolves ids
//! to nodes, so the tree never holds direct references between nodes.

use crate::common::config::{
    internal_capacity, leaf_capacity, CHILD_POINTER_SIZE, KEY_SIZE, NODE_HEADER_SIZE,
    VALUE_LEN_SIZE,
};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{NodeHeader, Page, PageType};

/// Leaf or internal. Fixed when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Holds keys and values.
    Leaf,
    /// Holds separator keys and child page ids.
    Internal,
}

impl NodeKind {
    fn page_type(self) -> PageType {
        match self {
            NodeKind::Leaf => PageType::Leaf,
            NodeKind::Internal => PageType::Internal,
        }
    }
}

/// One B+ tree node.
///
/// # Invariants
/// - `keys` strictly ascending
/// - leaf: `values.len() == keys.len()`, `children` empty
/// - internal: `children.len() == keys.len() + 1`, `values` empty;
///   `children[i]` covers `[keys[i-1], keys[i])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pgid: PageId,
    parent: PageId,
    kind: NodeKind,
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
    children: Vec<PageId>,
}

impl Node {
    /// Create an empty node.
    pub fn new(pgid: PageId, kind: NodeKind, parent: PageId) -> Self {
        Self {
            pgid,
            parent,
            kind,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an internal node whose only child is `child`.
    ///
    /// Used when the root splits and the tree grows a level.
    pub fn new_root(pgid: PageId, child: PageId) -> Self {
        let mut node = Self::new(pgid, NodeKind::Internal, PageId::NONE);
        node.children.push(child);
        node
    }

    #[inline]
    pub fn pgid(&self) -> PageId {
        self.pgid
    }

    #[inline]
    pub fn parent(&self) -> PageId {
        self.parent
    }

    #[inline]
    pub fn set_parent(&mut self, parent: PageId) {
        self.parent = parent;
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    /// Number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// A leaf without keys, or an internal node without children.
    pub fn is_empty(&self) -> bool {
        match self.kind {
            NodeKind::Leaf => self.keys.is_empty(),
            NodeKind::Internal => self.children.is_empty(),
        }
    }

    /// True once the node holds more keys than the split threshold.
    #[inline]
    pub fn is_overfull(&self, max_keys: usize) -> bool {
        self.keys.len() > max_keys
    }

    // ========================================================================
    // Leaf operations
    // ========================================================================

    /// Index of `key`, if present.
    pub fn find_key(&self, key: &[u8]) -> Option<usize> {
        self.keys.binary_search_by(|k| k.as_slice().cmp(key)).ok()
    }

    /// Value at `index` (leaf only).
    pub fn value(&self, index: usize) -> &[u8] {
        &self.values[index]
    }

    /// Overwrite the value at `index` (leaf only).
    pub fn set_value(&mut self, index: usize, value: Vec<u8>) {
        self.values[index] = value;
    }

    /// Insert a key/value pair in sorted position (leaf only).
    ///
    /// An existing key keeps its slot and has its value replaced. Returns
    /// `true` if the key was new.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        debug_assert!(self.is_leaf(), "insert on internal node");
        match self.keys.binary_search(&key) {
            Ok(index) => {
                self.values[index] = value;
                false
            }
            Err(index) => {
                self.keys.insert(index, key);
                self.values.insert(index, value);
                true
            }
        }
    }

    /// Remove the entry at `index` (leaf only).
    pub fn remove(&mut self, index: usize) -> (Vec<u8>, Vec<u8>) {
        debug_assert!(self.is_leaf(), "remove on internal node");
        (self.keys.remove(index), self.values.remove(index))
    }

    /// Visit entries in ascending order until `visit` returns `false`.
    ///
    /// Returns `false` if the visitor stopped early.
    pub fn scan_leaf<F>(&self, visit: &mut F) -> bool
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.keys
            .iter()
            .zip(&self.values)
            .all(|(k, v)| visit(k, v))
    }

    // ========================================================================
    // Internal operations
    // ========================================================================

    /// Child covering `key`: the child before the first key strictly
    /// greater than `key`, or the last child.
    ///
    /// # Errors
    /// `Error::CorruptedTree` if the node has no children or fewer children
    /// than its keys require.
    pub fn child_for(&self, key: &[u8]) -> Result<PageId> {
        if self.children.is_empty() {
            return Err(Error::corrupted_tree(self.pgid, "internal node has no children"));
        }
        let index = self
            .keys
            .iter()
            .position(|k| k.as_slice() > key)
            .unwrap_or(self.children.len() - 1);
        self.children
            .get(index)
            .copied()
            .ok_or_else(|| Error::corrupted_tree(self.pgid, "child index out of range"))
    }

    /// Install `sibling` right after `existing`, separated by `separator`.
    ///
    /// # Errors
    /// `Error::CorruptedTree` if `existing` is not a child of this node.
    pub fn insert_child_after(
        &mut self,
        existing: PageId,
        separator: Vec<u8>,
        sibling: PageId,
    ) -> Result<()> {
        let index = self
            .children
            .iter()
            .position(|&c| c == existing)
            .ok_or_else(|| {
                Error::corrupted_tree(self.pgid, format!("{} is not a child", existing))
            })?;
        self.keys.insert(index, separator);
        self.children.insert(index + 1, sibling);
        Ok(())
    }

    /// Remove `child` and its adjacent separator.
    ///
    /// The separator dropped is `keys[i-1]`, or `keys[0]` when the first
    /// child goes. Returns the child's former index, or `None` if it is
    /// not a child of this node.
    pub fn remove_child(&mut self, child: PageId) -> Option<usize> {
        let index = self.children.iter().position(|&c| c == child)?;
        self.children.remove(index);
        if !self.keys.is_empty() {
            self.keys.remove(index.saturating_sub(1));
        }
        Some(index)
    }

    // ========================================================================
    // Split
    // ========================================================================

    /// Move the upper half of this node into a new sibling.
    ///
    /// With `mid = len / 2`:
    /// - leaf: keys/values `[mid..]` move to the sibling and the sibling's
    ///   first key is returned as the separator (copied up)
    /// - internal: `keys[mid]` is returned as the separator (pushed up, not
    ///   kept), the sibling gets keys `[mid+1..]` and children `[mid+1..]`
    ///
    /// The sibling shares this node's parent. Moved children still point
    /// at this node; the caller re-parents them.
    pub fn split_off(&mut self, sibling_pgid: PageId) -> (Vec<u8>, Node) {
        let mid = self.keys.len() / 2;
        let mut sibling = Node::new(sibling_pgid, self.kind, self.parent);

        let separator = match self.kind {
            NodeKind::Leaf => {
                sibling.keys = self.keys.split_off(mid);
                sibling.values = self.values.split_off(mid);
                sibling.keys[0].clone()
            }
            NodeKind::Internal => {
                sibling.keys = self.keys.split_off(mid + 1);
                sibling.children = self.children.split_off(mid + 1);
                // keys[mid] is now the last key on the left.
                self.keys.pop().unwrap_or_default()
            }
        };

        (separator, sibling)
    }

    // ========================================================================
    // Page codec
    // ========================================================================

    /// Serialize into a node page.
    ///
    /// # Layout
    /// ```text
    /// header (13) | keys: n × KEY_SIZE | leaf: n × (u16 len | value_size)
    ///                                  | internal: (n + 1) × u64 child ids
    /// ... | CRC32 trailer (4)
    /// ```
    ///
    /// # Errors
    /// - `Error::CapacityExceeded` if the node does not fit a page
    /// - `Error::CorruptedTree` if an internal node's child count is off
    pub fn encode(&self, value_size: usize) -> Result<Page> {
        let capacity = match self.kind {
            NodeKind::Leaf => leaf_capacity(value_size),
            NodeKind::Internal => internal_capacity(),
        };
        if self.keys.len() > capacity {
            return Err(Error::CapacityExceeded {
                what: "keys per node page",
                size: self.keys.len(),
                max: capacity,
            });
        }
        if self.kind == NodeKind::Internal && self.children.len() != self.keys.len() + 1 {
            return Err(Error::corrupted_tree(
                self.pgid,
                format!(
                    "{} children for {} keys",
                    self.children.len(),
                    self.keys.len()
                ),
            ));
        }

        let mut page = Page::new();
        page.set_header(&NodeHeader::new(
            self.pgid.0,
            self.kind.page_type(),
            self.keys.len() as u32,
        ));

        let data = page.as_mut_slice();
        let mut offset = NODE_HEADER_SIZE;
        for key in &self.keys {
            write_slot(data, offset, key, KEY_SIZE, "key")?;
            offset += KEY_SIZE;
        }

        match self.kind {
            NodeKind::Leaf => {
                for value in &self.values {
                    write_slot(data, offset + VALUE_LEN_SIZE, value, value_size, "value")?;
                    // write_slot bounded the length by value_size, which fits a u16.
                    let len = value.len() as u16;
                    data[offset..offset + VALUE_LEN_SIZE].copy_from_slice(&len.to_le_bytes());
                    offset += VALUE_LEN_SIZE + value_size;
                }
            }
            NodeKind::Internal => {
                for child in &self.children {
                    data[offset..offset + CHILD_POINTER_SIZE].copy_from_slice(&child.0.to_le_bytes());
                    offset += CHILD_POINTER_SIZE;
                }
            }
        }

        page.update_checksum();
        Ok(page)
    }

    /// Parse a node page read from `pgid`.
    ///
    /// A page that was allocated but never written (all zeros) becomes an
    /// empty leaf. The parent link is not stored on disk; the caller sets it.
    ///
    /// # Errors
    /// `Error::CorruptedPage` on checksum mismatch, unknown type, a header
    /// naming a different page, a key count the page cannot hold, or a
    /// value length wider than `value_size`.
    pub fn decode(pgid: PageId, page: &Page, value_size: usize) -> Result<Node> {
        if page.is_zeroed() {
            return Ok(Node::new(pgid, NodeKind::Leaf, PageId::NONE));
        }
        if !page.verify_checksum() {
            return Err(Error::corrupted_page(pgid, "checksum mismatch"));
        }

        let header = page.header();
        if header.page_id != pgid.0 {
            return Err(Error::corrupted_page(
                pgid,
                format!("header names page {}", header.page_id),
            ));
        }
        let (kind, capacity) = match header.page_type {
            PageType::Leaf => (NodeKind::Leaf, leaf_capacity(value_size)),
            PageType::Internal => (NodeKind::Internal, internal_capacity()),
            PageType::Invalid => return Err(Error::corrupted_page(pgid, "unknown page type")),
        };
        let count = header.key_count as usize;
        if count > capacity {
            return Err(Error::corrupted_page(
                pgid,
                format!("key count {} exceeds {}", count, capacity),
            ));
        }

        let data = page.as_slice();
        let mut node = Node::new(pgid, kind, PageId::NONE);
        let mut offset = NODE_HEADER_SIZE;
        for _ in 0..count {
            node.keys.push(trim_nul(&data[offset..offset + KEY_SIZE]).to_vec());
            offset += KEY_SIZE;
        }

        match kind {
            NodeKind::Leaf => {
                for _ in 0..count {
                    let len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
                    if len > value_size {
                        return Err(Error::corrupted_page(
                            pgid,
                            format!("value length {} exceeds {}", len, value_size),
                        ));
                    }
                    let start = offset + VALUE_LEN_SIZE;
                    node.values.push(data[start..start + len].to_vec());
                    offset += VALUE_LEN_SIZE + value_size;
                }
            }
            NodeKind::Internal => {
                for _ in 0..=count {
                    let mut bytes = [0u8; CHILD_POINTER_SIZE];
                    bytes.copy_from_slice(&data[offset..offset + CHILD_POINTER_SIZE]);
                    let child = PageId::new(u64::from_le_bytes(bytes));
                    if !child.is_valid() {
                        return Err(Error::corrupted_page(pgid, "child pointer is zero"));
                    }
                    node.children.push(child);
                    offset += CHILD_POINTER_SIZE;
                }
            }
        }

        Ok(node)
    }
}

/// Strip the NUL padding of a fixed-width slot.
pub(crate) fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn write_slot(
    data: &mut [u8],
    offset: usize,
    bytes: &[u8],
    width: usize,
    what: &'static str,
) -> Result<()> {
    if bytes.len() > width {
        return Err(Error::CapacityExceeded {
            what,
            size: bytes.len(),
            max: width,
        });
    }
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(())
}
