pub mod cache;

pub use cache::{default_cache_path, CacheEntry, DigestCache};
