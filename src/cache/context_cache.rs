//! Fingerprint-keyed, version-bumped cache.
//!
//! An entry is valid only while both its item counter and its namespace
//! counter still hold the values captured when its key was computed. Bumping
//! a counter is the only way to invalidate; nothing is ever deleted by pattern.
//! Backend failures degrade to misses and no-ops.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::application::repos::CatalogReadRepo;
use crate::domain::ids::{ProductId, ShopId, ShopProductId};
use crate::domain::types::ProductMode;

use super::config::CacheConfig;
use super::context::CacheContext;
use super::keys::{CacheKey, Namespace, VersionKey, VersionStamp};
use super::store::{CacheBackend, CacheError, MemoryBackend, StoredEntry};

const SOURCE: &str = "cache::context_cache";
const METRIC_HIT: &str = "catalog_cache_hit_total";
const METRIC_MISS: &str = "catalog_cache_miss_total";
const METRIC_BUMP: &str = "catalog_cache_bump_total";
const METRIC_BACKEND_ERROR: &str = "catalog_cache_backend_error_total";

/// What a cascade bumped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub products: BTreeSet<ProductId>,
    pub shop_products: BTreeSet<ShopProductId>,
    /// Some relation lookups failed; only part of the cascade was bumped.
    pub partial: bool,
}

#[derive(Clone)]
pub struct ContextCache {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
}

impl ContextCache {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self { config, backend }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new(&config));
        Self::new(config, backend)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Compute the key for `(namespace, identifier, context)` and, when
    /// `allow_read` is set, look the entry up.
    ///
    /// The returned key carries the counters observed now; pass it to
    /// [`ContextCache::set`] after computing the value so that a bump in
    /// between leaves the stored entry already stale. With `allow_read` unset
    /// the counters are still read, since the caller is about to store under
    /// this key. A disabled cache touches no storage and returns an unstamped
    /// key.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        identifier: &str,
        context: &CacheContext,
        allow_read: bool,
    ) -> (CacheKey, Option<T>) {
        let mut key = CacheKey {
            namespace,
            identifier: identifier.to_string(),
            fingerprint: context.fingerprint(),
            stamp: None,
        };
        if !self.config.enabled {
            return (key, None);
        }
        key.stamp = self.read_stamp(&key).await;

        if !allow_read {
            return (key, None);
        }
        let value = self.lookup(&key).await;
        let metric = if value.is_some() {
            METRIC_HIT
        } else {
            METRIC_MISS
        };
        counter!(metric, "namespace" => namespace.as_str()).increment(1);
        (key, value)
    }

    /// Store `value` under the counters captured in `key`. `ttl` only bounds
    /// memory use; the version check governs validity.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        let Some(stamp) = key.stamp else {
            debug!(
                target = SOURCE,
                key = %key.storage_key(),
                "Skipping cache write without version stamp"
            );
            return;
        };

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                self.report_error("set", &CacheError::from(err));
                return;
            }
        };
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let entry = StoredEntry {
            payload,
            stamp,
            expires_at: expiry_after(ttl),
        };
        if let Err(err) = self.backend.store(key.storage_key(), entry).await {
            self.report_error("set", &err);
        }
    }

    /// Invalidate every entry of `(namespace, identifier)` regardless of context.
    pub async fn bump_item(&self, namespace: Namespace, identifier: &str) -> Option<u64> {
        self.bump(VersionKey::item(namespace, identifier)).await
    }

    /// Invalidate every entry of `namespace`.
    pub async fn bump_namespace(&self, namespace: Namespace) -> Option<u64> {
        self.bump(VersionKey::namespace(namespace)).await
    }

    /// Bump the given products together with everything whose cached values
    /// derive from them: their shop products, variation parents and children,
    /// and package parents and components.
    ///
    /// Relation lookups that fail are logged and skipped; the given products
    /// are always bumped.
    pub async fn bump_cascade_for_product(
        &self,
        reader: &dyn CatalogReadRepo,
        products: &[ProductId],
        shop: Option<ShopId>,
    ) -> CascadeReport {
        let mut report = CascadeReport {
            products: products.iter().copied().collect(),
            ..CascadeReport::default()
        };

        for &product_id in products {
            match reader.find_product(product_id).await {
                Ok(Some(product)) => {
                    if let Some(parent) = product.variation_parent_id {
                        report.products.insert(parent);
                    }
                    if product.mode == ProductMode::VariableVariationParent {
                        self.extend_from(
                            &mut report,
                            "variation_children",
                            reader.variation_children(product_id).await,
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        product = %product_id,
                        error = %err,
                        "Variation lookup failed during cascade"
                    );
                    report.partial = true;
                }
            }
            self.extend_from(
                &mut report,
                "package_parents",
                reader.package_parents(product_id).await,
            );
            self.extend_from(
                &mut report,
                "package_children",
                reader.package_children(product_id).await,
            );
        }

        let related: Vec<ProductId> = report.products.iter().copied().collect();
        match reader.shop_products_for_products(&related, shop).await {
            Ok(rows) => report
                .shop_products
                .extend(rows.into_iter().map(|row| row.id)),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    "Shop product lookup failed during cascade"
                );
                report.partial = true;
            }
        }

        for product in &report.products {
            self.bump_item(Namespace::PRODUCT, &product.to_string())
                .await;
        }
        for shop_product in &report.shop_products {
            self.bump_item(Namespace::SHOP_PRODUCT, &shop_product.to_string())
                .await;
        }

        debug!(
            target = SOURCE,
            products = report.products.len(),
            shop_products = report.shop_products.len(),
            partial = report.partial,
            "Cascade bumped"
        );
        report
    }

    fn extend_from<E: std::fmt::Display>(
        &self,
        report: &mut CascadeReport,
        relation: &'static str,
        result: Result<Vec<ProductId>, E>,
    ) {
        match result {
            Ok(ids) => report.products.extend(ids),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    relation,
                    error = %err,
                    "Relation lookup failed during cascade"
                );
                report.partial = true;
            }
        }
    }

    async fn bump(&self, key: VersionKey) -> Option<u64> {
        match self.backend.increment(&key).await {
            Ok(version) => {
                counter!(METRIC_BUMP, "namespace" => key.namespace.as_str()).increment(1);
                Some(version)
            }
            Err(err) => {
                self.report_error("bump", &err);
                None
            }
        }
    }

    async fn read_stamp(&self, key: &CacheKey) -> Option<VersionStamp> {
        let namespace = self.backend.version(&key.namespace_version_key()).await;
        let item = self.backend.version(&key.item_version_key()).await;
        match (namespace, item) {
            (Ok(namespace), Ok(item)) => Some(VersionStamp { namespace, item }),
            (Err(err), _) | (_, Err(err)) => {
                self.report_error("version", &err);
                None
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let stamp = key.stamp?;
        let entry = match self.backend.load(&key.storage_key()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                self.report_error("get", &err);
                return None;
            }
        };
        if entry.stamp != stamp || entry.is_expired(OffsetDateTime::now_utc()) {
            return None;
        }
        match serde_json::from_str(&entry.payload) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_error("get", &CacheError::from(err));
                None
            }
        }
    }

    fn report_error(&self, op: &'static str, err: &CacheError) {
        counter!(METRIC_BACKEND_ERROR, "op" => op).increment(1);
        warn!(target = SOURCE, op, error = %err, "Cache operation degraded");
    }
}

fn expiry_after(ttl: Duration) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .unwrap_or(now + time::Duration::weeks(52))
}
