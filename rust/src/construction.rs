//! Construction and configuration for PhTree.
//!
//! This module contains the tree configuration, its validation, and the
//! constructors. Every tree is created from a validated [`PhTreeConfig`];
//! `PhTree::new` is shorthand for the defaults.

use crate::compact_arena::CompactArena;
use crate::error::{InitResult, PhTreeError};
use crate::key_bits::KeyEncoding;
use crate::nested_index::{DEFAULT_PAGE_CAPACITY, MIN_PAGE_CAPACITY};
use crate::types::{PhTree, MAX_DIMENSIONS, NULL_NODE};

/// Default number of values above which a node moves to the nested index.
pub const DEFAULT_NI_VALUE_THRESHOLD: usize = 50;

/// Default number of children above which a node moves to the nested index.
pub const DEFAULT_NI_SUB_THRESHOLD: usize = 500;

/// Tree configuration.
///
/// # Examples
///
/// ```
/// use phtree::{KeyEncoding, PhTree, PhTreeConfig};
///
/// let config = PhTreeConfig::new(3)
///     .with_key_encoding(KeyEncoding::Signed)
///     .with_ni_thresholds(16, 64);
/// let tree = PhTree::<String>::with_config(config).unwrap();
/// assert_eq!(tree.dims(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhTreeConfig {
    /// Number of coordinates per key, `1..=MAX_DIMENSIONS`.
    pub dims: usize,
    /// How coordinates are ordered.
    pub key_encoding: KeyEncoding,
    /// A node holding more values than this uses the nested index.
    pub ni_value_threshold: usize,
    /// A node holding more children than this uses the nested index.
    pub ni_sub_threshold: usize,
    /// Whether dense hypercube arrays may be used at all.
    pub ahc_enabled: bool,
    /// Entries per nested index page.
    pub ni_page_capacity: usize,
}

impl PhTreeConfig {
    /// Default configuration for `dims`-dimensional unsigned keys.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            key_encoding: KeyEncoding::Unsigned,
            ni_value_threshold: DEFAULT_NI_VALUE_THRESHOLD,
            ni_sub_threshold: DEFAULT_NI_SUB_THRESHOLD,
            ahc_enabled: true,
            ni_page_capacity: DEFAULT_PAGE_CAPACITY,
        }
    }

    pub fn with_key_encoding(mut self, key_encoding: KeyEncoding) -> Self {
        self.key_encoding = key_encoding;
        self
    }

    /// Set the value and child counts above which nodes use the nested index.
    pub fn with_ni_thresholds(mut self, values: usize, subs: usize) -> Self {
        self.ni_value_threshold = values;
        self.ni_sub_threshold = subs;
        self
    }

    pub fn with_ahc(mut self, enabled: bool) -> Self {
        self.ahc_enabled = enabled;
        self
    }

    pub fn with_ni_page_capacity(mut self, capacity: usize) -> Self {
        self.ni_page_capacity = capacity;
        self
    }

    /// Check every field against its supported range.
    pub fn validate(&self) -> InitResult<()> {
        if self.dims == 0 || self.dims > MAX_DIMENSIONS {
            return Err(PhTreeError::invalid_dimensions(self.dims, MAX_DIMENSIONS));
        }
        if self.ni_page_capacity < MIN_PAGE_CAPACITY {
            return Err(PhTreeError::invalid_config(
                "ni_page_capacity",
                &format!(
                    "{} is below the minimum of {}",
                    self.ni_page_capacity, MIN_PAGE_CAPACITY
                ),
            ));
        }
        Ok(())
    }
}

impl<V> PhTree<V> {
    /// Create an empty tree for `dims`-dimensional unsigned keys.
    ///
    /// # Arguments
    ///
    /// * `dims` - Number of coordinates per key (1 to 62)
    ///
    /// # Returns
    ///
    /// Returns `Ok(PhTree)` if `dims` is supported, `Err(PhTreeError)` otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let tree = PhTree::<i32>::new(2).unwrap();
    /// assert!(tree.is_empty());
    /// assert!(PhTree::<i32>::new(0).is_err());
    /// ```
    pub fn new(dims: usize) -> InitResult<Self> {
        Self::with_config(PhTreeConfig::new(dims))
    }

    /// Create an empty tree for signed (`i64` bit pattern) keys.
    ///
    /// Coordinates are passed as `x as u64` and come back the same way.
    pub fn new_signed(dims: usize) -> InitResult<Self> {
        Self::with_config(PhTreeConfig::new(dims).with_key_encoding(KeyEncoding::Signed))
    }

    /// Create an empty tree from a full configuration.
    pub fn with_config(config: PhTreeConfig) -> InitResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            root: NULL_NODE,
            nodes: CompactArena::new(),
            len: 0,
        })
    }

    /// The configuration this tree was built with.
    pub fn config(&self) -> &PhTreeConfig {
        &self.config
    }
}
