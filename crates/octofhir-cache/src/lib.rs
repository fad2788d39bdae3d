//! Cache-aside caching over the shared key-value store.
//!
//! ## Stampede protection
//!
//! - **Coalescing**: concurrent misses for one key within a process run the
//!   loader once ([`singleflight`]).
//! - **Negative caching**: a "no data" load is remembered as a nil marker for
//!   a short fixed TTL, so absent keys do not reach the source repeatedly.
//! - **Jitter**: positive TTLs get up to 20% random extension so entries
//!   written together do not expire together.
//!
//! ## Graceful Degradation
//!
//! Reads fail open: when the store is unreachable the loader is called
//! directly and the cache is left alone.
//!
//! Locks ([`DistributedLock`]) are advisory and never gate the read path.

pub mod config;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod lock;
pub mod manager;
pub mod metrics;
pub mod singleflight;

pub use config::{CacheConfig, InvalidationConfig, LockConfig};
pub use error::{CacheError, CacheResult};
pub use invalidation::{InvalidationJob, InvalidationQueue};
pub use lock::DistributedLock;
pub use manager::{CacheManager, DELETE_BATCH_SIZE, NIL_MARKER, jittered_ttl};
pub use singleflight::SingleFlight;
