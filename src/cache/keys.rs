//! Cache key definitions.
//!
//! A [`CacheKey`] addresses one entry by namespace, identifier and context
//! fingerprint. Validity is governed by the [`VersionStamp`] captured when the
//! key was computed, never by timestamps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical grouping of entries produced by the same computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(&'static str);

impl Namespace {
    /// Per-product values (detail views, variation pickers).
    pub const PRODUCT: Namespace = Namespace("product");
    /// Per-shop-product prices resolved for a context.
    pub const SHOP_PRODUCT: Namespace = Namespace("shop-product");
    /// Filtered and sorted catalog listings.
    pub const CATALOG_LISTING: Namespace = Namespace("catalog-listing");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Address of a version counter. `identifier = None` is the namespace-wide
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey {
    pub namespace: Namespace,
    pub identifier: Option<String>,
}

impl VersionKey {
    pub fn item(namespace: Namespace, identifier: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Some(identifier.into()),
        }
    }

    pub fn namespace(namespace: Namespace) -> Self {
        Self {
            namespace,
            identifier: None,
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(identifier) => write!(f, "{}:{identifier}", self.namespace),
            None => write!(f, "{}:*", self.namespace),
        }
    }
}

/// Counter values an entry was computed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub namespace: u64,
    pub item: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub namespace: Namespace,
    pub identifier: String,
    pub fingerprint: String,
    /// `None` when the counters could not be read; such keys never store.
    pub stamp: Option<VersionStamp>,
}

impl CacheKey {
    /// Backend address of the entry. Versions are not part of it, so a bump
    /// leaves the old entry in place to be overwritten or evicted.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.namespace, self.identifier, self.fingerprint
        )
    }

    pub fn item_version_key(&self) -> VersionKey {
        VersionKey::item(self.namespace, self.identifier.clone())
    }

    pub fn namespace_version_key(&self) -> VersionKey {
        VersionKey::namespace(self.namespace)
    }
}
