//! Root-to-leaf descent.

use std::borrow::Cow;

use crate::btree::node::Node;
use crate::btree::tree::Tree;
use crate::common::{Error, PageId, Result};

/// Records the pages visited while descending to the leaf covering a key.
///
/// The stack is in root-to-leaf order; splits walk it in reverse.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    stack: Vec<PageId>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages visited by the last seek, root first.
    pub fn stack(&self) -> &[PageId] {
        &self.stack
    }

    /// Read-only descent. Uncached pages are decoded without caching.
    pub fn seek<'t>(&mut self, tree: &'t Tree, key: &[u8]) -> Result<Cow<'t, Node>> {
        self.stack.clear();
        let mut pgid = tree.root();
        loop {
            self.visit(pgid)?;
            let node = tree.load(pgid)?;
            if node.is_leaf() {
                return Ok(node);
            }
            pgid = node.child_for(key)?;
        }
    }

    /// Descent for a mutation: every node on the path is materialized in
    /// the cache with its parent link set. Returns the leaf.
    pub fn seek_mut(&mut self, tree: &mut Tree, key: &[u8]) -> Result<PageId> {
        self.stack.clear();
        let mut pgid = tree.root();
        let mut parent = PageId::NONE;
        loop {
            self.visit(pgid)?;
            let node = tree.node_mut(pgid, parent)?;
            if node.is_leaf() {
                return Ok(pgid);
            }
            parent = pgid;
            pgid = node.child_for(key)?;
        }
    }

    fn visit(&mut self, pgid: PageId) -> Result<()> {
        if self.stack.contains(&pgid) {
            return Err(Error::corrupted_tree(pgid, "cycle in child pointers"));
        }
        self.stack.push(pgid);
        Ok(())
    }
}
