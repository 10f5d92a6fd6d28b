//! Context cache.
//!
//! Values computed for a request context are stored under
//! `(namespace, identifier, fingerprint)` and stamped with the version
//! counters current when the key was computed. Invalidation only ever bumps
//! counters:
//!
//! - **Item bump**: one `(namespace, identifier)` counter, every context.
//! - **Namespace bump**: every identifier of a namespace.
//! - **Product cascade**: items related through variations, packages and
//!   shop products.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! entry_limit = 10000
//! default_ttl_seconds = 300
//! ```

mod config;
mod context;
mod context_cache;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use context::{CacheContext, Contact};
pub use context_cache::{CascadeReport, ContextCache};
pub use keys::{CacheKey, Namespace, VersionKey, VersionStamp};
pub use store::{CacheBackend, CacheError, MemoryBackend, StoredEntry};
