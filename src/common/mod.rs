//! Common types and utilities shared across bucketdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`Config`]
//! - Error types
//! - [`PageId`]

pub mod config;
pub mod error;
mod page_id;

pub use config::Config;
pub use error::{Error, Result};
pub use page_id::PageId;
