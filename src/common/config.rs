//! Configuration constants and runtime options for bucketdb.

use std::fmt;
use std::sync::Arc;

use crate::btree::SplitEvent;
use crate::common::{Error, Result};

/// Size of a node page in bytes (4KB).
///
/// # Memory Layout
/// With 4KB pages and 64-bit page ids the address space is never the
/// limiting factor; the file grows one page per allocation.
pub const PAGE_SIZE: usize = 4096;

/// Size of the meta directory region at the start of the file.
pub const META_PAGE_SIZE: usize = 4096;

/// Width of a key slot. Shorter keys are NUL-padded.
pub const KEY_SIZE: usize = 100;

/// Width of a bucket name in the meta directory.
pub const BUCKET_NAME_SIZE: usize = 100;

/// Default width of a value slot.
pub const DEFAULT_VALUE_SIZE: usize = 1000;

/// Default split threshold.
pub const DEFAULT_MAX_KEYS_PER_NODE: usize = 3;

/// `u64 pgid | u8 type | u32 keyCount`.
pub const NODE_HEADER_SIZE: usize = 13;

/// CRC32 trailer stored in the last bytes of every page.
pub const CHECKSUM_SIZE: usize = 4;

/// Width of a child pointer in an internal node page.
pub const CHILD_POINTER_SIZE: usize = 8;

/// Little-endian length stored in front of every leaf value.
pub const VALUE_LEN_SIZE: usize = 2;

/// Number of keys a leaf page can hold with the given value width.
pub const fn leaf_capacity(value_size: usize) -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE - CHECKSUM_SIZE) / (KEY_SIZE + VALUE_LEN_SIZE + value_size)
}

/// Number of keys an internal page can hold (it always carries one more
/// child pointer than keys).
pub const fn internal_capacity() -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE - CHECKSUM_SIZE - CHILD_POINTER_SIZE)
        / (KEY_SIZE + CHILD_POINTER_SIZE)
}

/// Callback fired after every node split.
pub type SplitHook = Arc<dyn Fn(&SplitEvent) + Send + Sync>;

/// Runtime options passed to [`Db::open`](crate::Db::open).
///
/// `value_size` is a deployment constant: a file must always be reopened
/// with the value width it was written with.
///
/// # Example
/// ```
/// use bucketdb::Config;
///
/// let config = Config::default().max_keys_per_node(2).value_size(200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct Config {
    /// A node splits once it holds more keys than this.
    pub max_keys_per_node: usize,
    /// Width of a value slot on disk.
    pub value_size: usize,
    /// fsync after every page write.
    pub sync_writes: bool,
    /// Observability hook invoked after each split.
    pub on_split: Option<SplitHook>,
}

impl Config {
    /// Set the split threshold.
    pub fn max_keys_per_node(mut self, max_keys: usize) -> Self {
        self.max_keys_per_node = max_keys;
        self
    }

    /// Set the value slot width.
    pub fn value_size(mut self, value_size: usize) -> Self {
        self.value_size = value_size;
        self
    }

    /// Enable or disable fsync after each write.
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Install a split hook.
    pub fn on_split<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SplitEvent) + Send + Sync + 'static,
    {
        self.on_split = Some(Arc::new(hook));
        self
    }

    /// Check that every node page can hold `max_keys_per_node` keys.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if the threshold is below 2 or the value
    ///   width is zero
    /// - `Error::CapacityExceeded` if a full leaf or internal node would
    ///   not fit a page
    pub fn validate(&self) -> Result<()> {
        if self.max_keys_per_node < 2 {
            return Err(Error::InvalidConfig(format!(
                "max_keys_per_node must be at least 2, got {}",
                self.max_keys_per_node
            )));
        }
        if self.value_size == 0 {
            return Err(Error::InvalidConfig("value_size must be > 0".into()));
        }

        let leaf_max = leaf_capacity(self.value_size);
        if self.max_keys_per_node > leaf_max {
            return Err(Error::CapacityExceeded {
                what: "leaf keys per page",
                size: self.max_keys_per_node,
                max: leaf_max,
            });
        }

        let internal_max = internal_capacity();
        if self.max_keys_per_node > internal_max {
            return Err(Error::CapacityExceeded {
                what: "internal keys per page",
                size: self.max_keys_per_node,
                max: internal_max,
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_keys_per_node: DEFAULT_MAX_KEYS_PER_NODE,
            value_size: DEFAULT_VALUE_SIZE,
            sync_writes: true,
            on_split: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_keys_per_node", &self.max_keys_per_node)
            .field("value_size", &self.value_size)
            .field("sync_writes", &self.sync_writes)
            .field("on_split", &self.on_split.is_some())
            .finish()
    }
}
