//! Cache-aside storage for expensive back-office reads.
//!
//! - [`CacheBackend`]: the shared key/byte-blob cache ([`MemoryCache`],
//!   [`RedbCache`])
//! - [`CacheAside`]: get-or-populate with time-based freshness
//! - [`catalog`]: the album listing wire shape and [`CatalogCache`]

pub mod backend;
pub mod catalog;
pub mod error;
pub mod redb_store;
pub mod store;

pub use backend::{CacheBackend, MemoryCache};
pub use catalog::{
    decode_listing, encode_listing, AlbumRecord, CatalogCache, CatalogSource, Price,
    ALBUMS_OF_TODAY,
};
pub use error::{JsonCacheError, Result};
pub use redb_store::{CacheMetadata, CacheStats, RedbCache};
pub use store::{CacheAside, Clock, ManualClock, SystemClock};
