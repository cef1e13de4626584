//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container with a CRC32 trailer
//! - [`NodeHeader`] - Metadata at the start of every node page
//! - [`PageType`] - Leaf / internal discriminator

#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use page::Page;
pub use page_header::{NodeHeader, PageType};
