//! rowcache cache layer
//!
//! - **keys**: canonical [`CacheKey`] encoding of a query template
//! - **store**: the [`CacheStore`] contract and the in-process [`MemoryCacheStore`]
//! - **policy**: [`CachePolicy`], which decides whether retrieval reads and
//!   populates the cache
//!
//! Entries never expire. The only invalidation is a bulk flush.

mod keys;
mod policy;
mod store;

pub use keys::{CacheKey, encode};
pub use policy::CachePolicy;
pub use store::{CacheError, CacheStore, MemoryCacheStore};
