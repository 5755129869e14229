/// Caching layer for blog-service
///
/// Only the global feed is cached, as whole rendered pages with a fixed TTL.
pub mod page_cache;

pub use page_cache::PageCache;
