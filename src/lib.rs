//! bucketdb - An embedded single-file key-value store with named buckets.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            bucketdb                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                    Db (db.rs)                            │   │
//! │  │         open / bucket(name) / flush / close              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Buckets (btree/)                            │   │
//! │  │   Bucket → Tree (node cache + dirty set) → Cursor        │   │
//! │  │   put / get / delete / scan, split, empty-leaf reclaim   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │   DiskManager + Page + NodeHeader + MetaDirectory        │   │
//! │  │   (page 0: allocator, free list, bucket roots)           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, config)
//! - [`storage`] - Disk I/O, page formats and the meta directory
//! - [`btree`] - B+ tree nodes and bucket handles
//!
//! # Quick Start
//! ```no_run
//! use bucketdb::{Config, Db};
//!
//! let db = Db::open("my_database.db", Config::default())?;
//!
//! let users = db.bucket("users")?;
//! users.put(b"name", b"Ahmed")?;
//! assert_eq!(users.get(b"name")?, b"Ahmed");
//!
//! db.close()?;
//! # Ok::<(), bucketdb::Error>(())
//! ```

pub mod btree;
pub mod common;
mod db;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{KEY_SIZE, PAGE_SIZE};
pub use common::{Config, Error, PageId, Result};

pub use btree::{Bucket, Node, NodeKind, SplitEvent};
pub use db::Db;
pub use storage::page::{NodeHeader, Page, PageType};
pub use storage::{DiskManager, StatsSnapshot};
