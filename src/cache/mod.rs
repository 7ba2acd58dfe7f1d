//! Whole-page cache for the home feed.
//!
//! Rendered `200 OK` responses are kept per viewer, path and page number for
//! a fixed TTL. Entries only leave the cache by expiring or by an explicit
//! [`PageCache::clear`] (wired to `SIGHUP` by the server); writes elsewhere
//! in the application do not invalidate them.

mod keys;
mod lock;
mod middleware;
mod store;
mod trigger;

pub use keys::PageKey;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachedPage, PageCache};
pub use trigger::clear_on_request;
