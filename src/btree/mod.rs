//! B+ tree buckets.
//!
//! Each bucket is an independent B+ tree over fixed-width node pages:
//! - [`Node`] - in-memory node and its page codec
//! - `Cursor` - root-to-leaf descent recording the visited pages
//! - [`Bucket`] - the public handle (put / get / delete / scan)
//!
//! Leaves hold the data; internal nodes hold separator keys and child page
//! ids. A leaf split copies its separator up, an internal split pushes it up.

mod bucket;
mod cursor;
mod mermaid;
mod node;
mod tree;

pub use bucket::Bucket;
pub use node::{Node, NodeKind};

pub(crate) use tree::Tree;

use crate::common::PageId;

/// Reported to the [`Config::on_split`](crate::Config::on_split) hook after
/// a node splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEvent {
    /// Bucket that owns the node.
    pub bucket: String,
    /// The node that split. It keeps the lower half.
    pub page_id: PageId,
    /// Newly allocated node holding the upper half.
    pub sibling: PageId,
    /// Kind of both halves.
    pub kind: NodeKind,
    /// Set when the split node was the root and the tree grew a level.
    pub new_root: Option<PageId>,
}
