//! Storage layer - disk I/O, page formats and the meta directory.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level file I/O (the page store)
//! - [`MetaDirectory`] - Page-id allocator, free list and bucket table
//! - [`page`] - Page types and layouts
//! - [`IoStats`] - I/O counters

mod disk_manager;
mod meta;
pub mod page;
mod stats;

pub use disk_manager::DiskManager;
pub use meta::MetaDirectory;
pub use stats::{IoStats, StatsSnapshot};
