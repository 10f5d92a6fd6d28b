//! Routes catalog mutation events to the indexer and the context cache.
//!
//! Each dispatch re-indexes synchronously, then bumps the cache. Indexing
//! failures are returned to the caller without retry; cache failures are
//! only logged.

mod events;
mod plan;

pub use events::CatalogEvent;
pub use plan::DispatchPlan;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::application::indexer::{CatalogIndexer, IndexError, IndexReport};
use crate::application::repos::CatalogReadRepo;
use crate::cache::{CascadeReport, ContextCache, Namespace};
use crate::domain::ids::{ProductId, ShopId, ShopProductId};

const METRIC_DISPATCH_MS: &str = "catalog_dispatch_ms";
const SOURCE: &str = "application::router";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    Product(ProductId),
    ShopProduct(ShopProductId),
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexTarget::Product(id) => write!(f, "product {id}"),
            IndexTarget::ShopProduct(id) => write!(f, "shop product {id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("re-indexing {target} failed")]
    Index {
        target: IndexTarget,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub indexed: IndexReport,
    pub cascade: CascadeReport,
    pub listings_bumped: bool,
}

#[derive(Clone)]
pub struct InvalidationRouter {
    reader: Arc<dyn CatalogReadRepo>,
    indexer: CatalogIndexer,
    cache: ContextCache,
}

impl InvalidationRouter {
    pub fn new(
        reader: Arc<dyn CatalogReadRepo>,
        indexer: CatalogIndexer,
        cache: ContextCache,
    ) -> Self {
        Self {
            reader,
            indexer,
            cache,
        }
    }

    pub async fn dispatch(&self, event: &CatalogEvent) -> Result<DispatchReport, DispatchError> {
        self.dispatch_all(std::slice::from_ref(event)).await
    }

    /// Merge `events` into one plan and run it.
    ///
    /// The cache phase runs even when re-indexing fails so that nothing keeps
    /// serving values derived from the old state; the indexing error is still
    /// returned.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn dispatch_all(
        &self,
        events: &[CatalogEvent],
    ) -> Result<DispatchReport, DispatchError> {
        let started_at = Instant::now();
        let plan = DispatchPlan::from_events(events);
        if plan.is_empty() {
            debug!(target = SOURCE, "Dispatch skipped: empty plan");
            return Ok(DispatchReport::default());
        }
        debug!(target = SOURCE, plan = %plan, "Dispatch plan built");

        let mut report = DispatchReport::default();
        let index_result = self.reindex(&plan, &mut report.indexed).await;

        report.cascade = self.invalidate(&plan).await;
        if plan.bump_listings {
            self.cache.bump_namespace(Namespace::CATALOG_LISTING).await;
            report.listings_bumped = true;
        }

        let kinds: Vec<&'static str> = events.iter().map(CatalogEvent::kind).collect();
        histogram!(METRIC_DISPATCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        match &index_result {
            Ok(()) => info!(
                target = SOURCE,
                kinds = ?kinds,
                shop_products = report.indexed.shop_products,
                bumped_products = report.cascade.products.len(),
                bumped_shop_products = report.cascade.shop_products.len(),
                partial_cascade = report.cascade.partial,
                "Catalog events dispatched"
            ),
            Err(err) => warn!(
                target = SOURCE,
                kinds = ?kinds,
                error = %err,
                "Catalog event dispatch failed"
            ),
        }

        index_result.map(|()| report)
    }

    async fn reindex(
        &self,
        plan: &DispatchPlan,
        report: &mut IndexReport,
    ) -> Result<(), DispatchError> {
        for &product in &plan.index_products {
            let result = self.indexer.index_product(product).await;
            let indexed = tolerate_removed(result, IndexTarget::Product(product))?;
            report.merge(indexed);
        }
        for &shop_product in &plan.index_shop_products {
            let result = self.indexer.index_shop_product(shop_product).await;
            let indexed = tolerate_removed(result, IndexTarget::ShopProduct(shop_product))?;
            report.merge(indexed);
        }
        Ok(())
    }

    async fn invalidate(&self, plan: &DispatchPlan) -> CascadeReport {
        let mut cascades: BTreeMap<Option<ShopId>, BTreeSet<ProductId>> =
            plan.cascade_products.clone();
        let mut report = CascadeReport::default();

        for &shop_product_id in &plan.cascade_shop_products {
            match self.reader.find_shop_product(shop_product_id).await {
                Ok(Some(row)) => {
                    cascades
                        .entry(Some(row.shop_id))
                        .or_default()
                        .insert(row.product_id);
                }
                Ok(None) => self.bump_orphan(shop_product_id, &mut report).await,
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        shop_product = %shop_product_id,
                        error = %err,
                        "Shop product lookup failed before cascade"
                    );
                    report.partial = true;
                    self.bump_orphan(shop_product_id, &mut report).await;
                }
            }
        }

        for (shop, manufacturers) in &plan.cascade_manufacturers {
            for &manufacturer in manufacturers {
                match self.reader.products_for_manufacturer(manufacturer).await {
                    Ok(products) => cascades.entry(*shop).or_default().extend(products),
                    Err(err) => {
                        warn!(
                            target = SOURCE,
                            manufacturer = %manufacturer,
                            error = %err,
                            "Manufacturer lookup failed before cascade"
                        );
                        report.partial = true;
                    }
                }
            }
        }

        for (shop, products) in cascades {
            if products.is_empty() {
                continue;
            }
            let products: Vec<ProductId> = products.into_iter().collect();
            let cascade = self
                .cache
                .bump_cascade_for_product(self.reader.as_ref(), &products, shop)
                .await;
            report.products.extend(cascade.products);
            report.shop_products.extend(cascade.shop_products);
            report.partial |= cascade.partial;
        }

        for &product in &plan.bump_products {
            if report.products.insert(product) {
                self.cache
                    .bump_item(Namespace::PRODUCT, &product.to_string())
                    .await;
            }
        }
        report
    }

    /// Shop products that cannot be resolved still get their own bump.
    async fn bump_orphan(&self, shop_product_id: ShopProductId, report: &mut CascadeReport) {
        if report.shop_products.insert(shop_product_id) {
            self.cache
                .bump_item(Namespace::SHOP_PRODUCT, &shop_product_id.to_string())
                .await;
        }
    }
}

/// A row deleted before its event was handled has nothing left to index.
fn tolerate_removed(
    result: Result<IndexReport, IndexError>,
    target: IndexTarget,
) -> Result<IndexReport, DispatchError> {
    match result {
        Ok(report) => Ok(report),
        Err(IndexError::ProductNotFound(id)) if target == IndexTarget::Product(id) => {
            debug!(target = SOURCE, index_target = %target, "Indexed row no longer exists");
            Ok(IndexReport::default())
        }
        Err(IndexError::ShopProductNotFound(id)) if target == IndexTarget::ShopProduct(id) => {
            debug!(target = SOURCE, index_target = %target, "Indexed row no longer exists");
            Ok(IndexReport::default())
        }
        Err(source) => Err(DispatchError::Index { target, source }),
    }
}
