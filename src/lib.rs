#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A key-value map over the linear-probing [`HashTable`].
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

pub mod hash_table;

pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The default [`BuildHasher`](core::hash::BuildHasher) used by
        /// [`HashMap`] when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The default [`BuildHasher`](core::hash::BuildHasher) used by
        /// [`HashMap`] when none is specified.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        /// Placeholder hash builder available when neither `std` nor
        /// `foldhash` is enabled.
        ///
        /// This type is uninhabited; construct maps with
        /// [`HashMap::with_hasher`] instead.
        pub enum DefaultHashBuilder {}
    }
}
