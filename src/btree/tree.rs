//! Per-bucket working set: node cache, dirty set and the tree algorithms.

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::btree::cursor::Cursor;
use crate::btree::node::{Node, NodeKind};
use crate::btree::SplitEvent;
use crate::common::{Error, PageId, Result};
use crate::db::Shared;

/// The B+ tree behind a [`Bucket`](super::Bucket).
///
/// Nodes are materialized into `nodes` on first write access and stay
/// cached for the life of the `Db`. Every mutation marks the node dirty;
/// [`flush`](Tree::flush) writes the dirty set in ascending page order and
/// then persists the meta directory.
///
/// Not thread-safe by itself. The bucket handle wraps it in an `RwLock`.
pub(crate) struct Tree {
    name: String,
    root: PageId,
    nodes: HashMap<PageId, Node>,
    dirty: BTreeSet<PageId>,
    shared: Arc<Shared>,
}

impl Tree {
    pub fn new(name: String, root: PageId, shared: Arc<Shared>) -> Self {
        Self {
            name,
            root,
            nodes: HashMap::new(),
            dirty: BTreeSet::new(),
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn max_keys(&self) -> usize {
        self.shared.config.max_keys_per_node
    }

    pub fn value_size(&self) -> usize {
        self.shared.config.value_size
    }

    /// Number of nodes waiting for the next flush.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // ========================================================================
    // Node access
    // ========================================================================

    /// Read access to a node: the cached copy, or a transient decode of the
    /// page that is not added to the cache.
    pub fn load(&self, pgid: PageId) -> Result<Cow<'_, Node>> {
        match self.nodes.get(&pgid) {
            Some(node) => Ok(Cow::Borrowed(node)),
            None => read_node(&self.shared, pgid).map(Cow::Owned),
        }
    }

    /// Write access to a node, hydrating it from disk on a cache miss.
    ///
    /// `parent` is recorded on a freshly hydrated node; cached nodes keep
    /// the parent maintained by splits.
    pub fn node_mut(&mut self, pgid: PageId, parent: PageId) -> Result<&mut Node> {
        match self.nodes.entry(pgid) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut node = read_node(&self.shared, pgid)?;
                node.set_parent(parent);
                Ok(entry.insert(node))
            }
        }
    }

    /// A node that must already be cached.
    fn cached_mut(&mut self, pgid: PageId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&pgid)
            .ok_or_else(|| Error::corrupted_tree(pgid, "node is not materialized"))
    }

    fn mark_dirty(&mut self, pgid: PageId) {
        self.dirty.insert(pgid);
    }

    /// Drop a node from the working set. Its id becomes reusable once
    /// this bucket flushes.
    fn release(&mut self, pgid: PageId) -> Result<()> {
        self.nodes.remove(&pgid);
        self.dirty.remove(&pgid);
        self.shared.meta.free(&self.name, pgid)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Look up `key`. Never mutates the cache.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut cursor = Cursor::new();
        let leaf = cursor.seek(self, key)?;
        Ok(leaf.find_key(key).map(|index| leaf.value(index).to_vec()))
    }

    /// Insert or overwrite. Returns `true` if the key was new.
    ///
    /// Every page id the resulting splits need is allocated before the
    /// leaf changes, so a failed allocation leaves the tree untouched.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<bool> {
        let mut cursor = Cursor::new();
        let leaf = cursor.seek_mut(self, &key)?;

        let node = self.cached_mut(leaf)?;
        if let Some(index) = node.find_key(&key) {
            node.set_value(index, value);
            self.mark_dirty(leaf);
            return Ok(false);
        }

        let needed = self.pages_for_insert(cursor.stack())?;
        let mut reserved = self.shared.meta.allocate_many(needed)?.into_iter();

        self.cached_mut(leaf)?.insert(key, value);
        self.mark_dirty(leaf);
        for &pgid in cursor.stack().iter().rev() {
            self.split(pgid, &mut reserved)?;
        }
        Ok(true)
    }

    /// Page ids consumed by inserting one new key at the end of `path`:
    /// a sibling for every node that will overflow, plus a root if the
    /// overflow reaches it.
    fn pages_for_insert(&self, path: &[PageId]) -> Result<usize> {
        let max_keys = self.max_keys();
        let mut needed = 0;
        for &pgid in path.iter().rev() {
            let node = self
                .nodes
                .get(&pgid)
                .ok_or_else(|| Error::corrupted_tree(pgid, "node is not materialized"))?;
            if node.len() < max_keys {
                break;
            }
            needed += 1;
            if !node.parent().is_valid() {
                needed += 1;
            }
        }
        Ok(needed)
    }

    /// Overwrite an existing key.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if the key is absent.
    pub fn update(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let mut cursor = Cursor::new();
        let leaf = cursor.seek_mut(self, key)?;

        let node = self.cached_mut(leaf)?;
        let index = node.find_key(key).ok_or(Error::KeyNotFound)?;
        node.set_value(index, value);
        self.mark_dirty(leaf);
        Ok(())
    }

    /// Remove `key`, reclaiming its leaf if that leaves it empty.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut cursor = Cursor::new();
        let leaf = cursor.seek_mut(self, key)?;

        let node = self.cached_mut(leaf)?;
        let index = node.find_key(key).ok_or(Error::KeyNotFound)?;
        node.remove(index);
        let emptied = node.is_empty();
        self.mark_dirty(leaf);

        if emptied {
            self.possible_free(leaf)?;
        }
        Ok(())
    }

    /// In-order traversal; stops when `visit` returns `false`.
    pub fn scan<F>(&self, visit: &mut F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan_from(self.root, visit).map(|_| ())
    }

    fn scan_from<F>(&self, pgid: PageId, visit: &mut F) -> Result<bool>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let node = self.load(pgid)?;
        if node.is_leaf() {
            return Ok(node.scan_leaf(visit));
        }
        for &child in node.children() {
            if !self.scan_from(child, visit)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ========================================================================
    // Structure maintenance
    // ========================================================================

    /// Split `pgid` if it holds more than `max_keys` keys.
    ///
    /// The parent receives the separator but is not checked here; `put`
    /// walks the cursor path bottom-up. New pages come from `reserved`.
    fn split(&mut self, pgid: PageId, reserved: &mut impl Iterator<Item = PageId>) -> Result<()> {
        let max_keys = self.max_keys();
        let node = self.cached_mut(pgid)?;
        if !node.is_overfull(max_keys) {
            return Ok(());
        }
        let kind = node.kind();
        let mut parent = node.parent();

        let mut next_page = || {
            reserved
                .next()
                .ok_or_else(|| Error::corrupted_tree(pgid, "split ran out of reserved pages"))
        };

        let mut new_root = None;
        if !parent.is_valid() {
            let root = next_page()?;
            self.nodes.insert(root, Node::new_root(root, pgid));
            self.mark_dirty(root);
            self.cached_mut(pgid)?.set_parent(root);
            self.root = root;
            self.shared.meta.set_root(&self.name, root)?;
            parent = root;
            new_root = Some(root);
        }

        let sibling_id = next_page()?;
        let (separator, mut sibling) = self.cached_mut(pgid)?.split_off(sibling_id);
        sibling.set_parent(parent);

        // Uncached children pick up their parent when hydrated.
        for child in sibling.children() {
            if let Some(moved) = self.nodes.get_mut(child) {
                moved.set_parent(sibling_id);
            }
        }
        self.nodes.insert(sibling_id, sibling);
        self.mark_dirty(sibling_id);
        self.mark_dirty(pgid);

        self.cached_mut(parent)?
            .insert_child_after(pgid, separator, sibling_id)?;
        self.mark_dirty(parent);

        debug!(
            bucket = %self.name,
            page = %pgid,
            sibling = %sibling_id,
            ?kind,
            grew = new_root.is_some(),
            "split node"
        );

        if let Some(hook) = &self.shared.config.on_split {
            hook(&SplitEvent {
                bucket: self.name.clone(),
                page_id: pgid,
                sibling: sibling_id,
                kind,
                new_root,
            });
        }
        Ok(())
    }

    /// Unlink an empty node from its parent and free its page.
    ///
    /// Skipped for the root and for a node that is its parent's only
    /// child, so internal nodes never end up childless. Returns whether
    /// the node was reclaimed.
    fn possible_free(&mut self, pgid: PageId) -> Result<bool> {
        let node = self.cached_mut(pgid)?;
        let parent_id = node.parent();
        if !node.is_empty() || !parent_id.is_valid() {
            return Ok(false);
        }

        let parent = self.cached_mut(parent_id)?;
        if parent.children().len() <= 1 {
            return Ok(false);
        }
        if parent.remove_child(pgid).is_none() {
            return Err(Error::corrupted_tree(
                parent_id,
                format!("{} is not a child", pgid),
            ));
        }
        self.mark_dirty(parent_id);
        self.release(pgid)?;

        debug!(bucket = %self.name, page = %pgid, parent = %parent_id, "reclaimed empty node");
        Ok(true)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write every dirty node, publish this bucket's root and released
    /// pages, then write the meta directory. Returns the number of node
    /// pages written.
    pub fn flush(&mut self) -> Result<usize> {
        let value_size = self.value_size();
        let mut store = self.shared.store.lock();

        for &pgid in &self.dirty {
            let node = self
                .nodes
                .get(&pgid)
                .ok_or_else(|| Error::corrupted_tree(pgid, "dirty node is not materialized"))?;
            store.write_page(pgid, &node.encode(value_size)?)?;
        }
        self.shared.meta.commit(&self.name)?;
        self.shared.meta.persist(&mut store)?;

        let written = self.dirty.len();
        self.dirty.clear();
        debug!(bucket = %self.name, pages = written, "flushed bucket");
        Ok(written)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Number of levels, counting the root and the leaves.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut node = self.load(self.root)?;
        while !node.is_leaf() {
            let first = *node
                .children()
                .first()
                .ok_or_else(|| Error::corrupted_tree(node.pgid(), "internal node has no children"))?;
            node = self.load(first)?;
            height += 1;
        }
        Ok(height)
    }

    /// Check every structural invariant of the tree.
    ///
    /// # Errors
    /// `Error::CorruptedTree` naming the first offending page.
    pub fn verify(&self) -> Result<()> {
        let mut verifier = Verifier {
            tree: self,
            free: self.shared.meta.free_pages().into_iter().collect(),
            seen: HashSet::new(),
            leaf_depth: None,
        };
        verifier.check(self.root, PageId::NONE, None, None, 0, 1)
    }
}

struct Verifier<'a> {
    tree: &'a Tree,
    free: HashSet<PageId>,
    seen: HashSet<PageId>,
    leaf_depth: Option<usize>,
}

impl Verifier<'_> {
    fn check(
        &mut self,
        pgid: PageId,
        parent: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        siblings: usize,
    ) -> Result<()> {
        let fail = |reason: String| -> Result<()> { Err(Error::corrupted_tree(pgid, reason)) };

        if self.free.contains(&pgid) {
            return fail("page is on the free list".into());
        }
        if !self.seen.insert(pgid) {
            return fail("page is reachable twice".into());
        }

        let tree = self.tree;
        let cached = tree.nodes.contains_key(&pgid);
        let node = tree.load(pgid)?;
        if cached && node.parent() != parent {
            return fail(format!("parent is {}, expected {}", node.parent(), parent));
        }
        if node.is_empty() && siblings > 1 {
            return fail("empty node with siblings".into());
        }

        let keys = node.keys();
        if keys.len() > tree.max_keys() {
            return fail(format!("{} keys exceed {}", keys.len(), tree.max_keys()));
        }
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return fail("keys are not strictly ascending".into());
        }
        if let (Some(lo), Some(first)) = (lower, keys.first()) {
            if first.as_slice() < lo {
                return fail("key below the parent separator".into());
            }
        }
        if let (Some(hi), Some(last)) = (upper, keys.last()) {
            if last.as_slice() >= hi {
                return fail("key at or above the parent separator".into());
            }
        }

        match node.kind() {
            NodeKind::Leaf => {
                if node.values().len() != keys.len() {
                    return fail("value count differs from key count".into());
                }
                let expected = *self.leaf_depth.get_or_insert(depth);
                if expected != depth {
                    return fail(format!("leaf at depth {}, expected {}", depth, expected));
                }
            }
            NodeKind::Internal => {
                let children = node.children();
                if children.len() != keys.len() + 1 {
                    return fail(format!(
                        "{} children for {} keys",
                        children.len(),
                        keys.len()
                    ));
                }
                for (i, &child) in children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(keys[i - 1].as_slice()) };
                    let hi = keys.get(i).map(Vec::as_slice).or(upper);
                    self.check(child, pgid, lo, hi, depth + 1, children.len())?;
                }
            }
        }
        Ok(())
    }
}

fn read_node(shared: &Shared, pgid: PageId) -> Result<Node> {
    let page = shared.store.lock().read_page(pgid)?;
    Node::decode(pgid, &page, shared.config.value_size)
}
