//! Single-flight groups and a read-through cache with placeholder
//! negative caching, mirroring `original_source/lib/syncx/
//! {exclusivecall,lockedcall}.go` and `lib/stores/internal/cache.go`.

pub mod cache;
pub mod db;
pub mod error;
pub mod lockedcalls;
pub mod sfgroup;
pub mod stat;
#[cfg(test)]
mod test_support;

pub use cache::{Cache, CacheKv, NOT_FOUND_EXPIRY, NOT_FOUND_PLACEHOLDER};
pub use db::{CachedConn, Db};
pub use error::{CacheError, DbError, TakeError};
pub use lockedcalls::LockedCalls;
pub use sfgroup::SfGroup;
pub use stat::{CacheStat, CacheStatSnapshot};
