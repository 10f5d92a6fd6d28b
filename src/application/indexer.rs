//! Materializes catalog prices and availability into stored scope rows.
//!
//! The indexer is the only writer of the catalog columns. Every operation is
//! idempotent: the stored rows depend only on the current catalog state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::stream::{self, TryStreamExt};
use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{CatalogReadRepo, CatalogWriteRepo, RepoError};
use crate::domain::availability;
use crate::domain::entities::{CatalogPriceRow, ProductRecord, ShopProductRecord};
use crate::domain::error::DomainError;
use crate::domain::ids::{ProductId, ShopId, ShopProductId};
use crate::domain::pricing;
use crate::domain::types::ProductMode;

const METRIC_INDEX_MS: &str = "catalog_index_ms";
const SOURCE: &str = "application::indexer";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("product `{0}` not found")]
    ProductNotFound(ProductId),
    #[error("shop product `{0}` not found")]
    ShopProductNotFound(ShopProductId),
    #[error("malformed product hierarchy: {message}")]
    MalformedHierarchy { message: String },
    #[error("missing referenced record: {message}")]
    MissingReference { message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl IndexError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedHierarchy {
            message: message.into(),
        }
    }
}

/// Counts of what a single index call touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub products: usize,
    pub shop_products: usize,
    pub availability_refreshed: usize,
    pub skipped_children: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: IndexReport) {
        self.products += other.products;
        self.shop_products += other.shop_products;
        self.availability_refreshed += other.availability_refreshed;
        self.skipped_children += other.skipped_children;
    }
}

#[derive(Clone)]
pub struct CatalogIndexer {
    reader: Arc<dyn CatalogReadRepo>,
    writer: Arc<dyn CatalogWriteRepo>,
    reindex_concurrency: usize,
}

impl CatalogIndexer {
    pub fn new(
        reader: Arc<dyn CatalogReadRepo>,
        writer: Arc<dyn CatalogWriteRepo>,
        reindex_concurrency: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            reindex_concurrency: reindex_concurrency.max(1),
        }
    }

    /// Index every shop product of a product according to its mode.
    #[instrument(skip_all, fields(product = %product_id))]
    pub async fn index_product(&self, product_id: ProductId) -> Result<IndexReport, IndexError> {
        let started_at = Instant::now();
        let product = self
            .reader
            .find_product(product_id)
            .await?
            .ok_or(IndexError::ProductNotFound(product_id))?;

        let mut report = IndexReport::default();
        match product.mode {
            ProductMode::VariableVariationParent => {
                report.merge(self.index_own_rows(&product).await?);
                report.merge(self.index_variation_children(&product).await?);
            }
            ProductMode::VariationChild => {
                if product.variation_parent_id.is_none() {
                    return Err(IndexError::malformed(format!(
                        "variation child {} has no parent",
                        product.id
                    )));
                }
                report.merge(self.index_own_rows(&product).await?);
            }
            ProductMode::PackageParent
            | ProductMode::PackageChild
            | ProductMode::Normal
            | ProductMode::Subscription => {
                report.merge(self.index_own_rows(&product).await?);
            }
        }
        report.merge(self.refresh_package_parents(product.id, None).await?);

        histogram!(METRIC_INDEX_MS, "op" => "product")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            mode = product.mode.as_str(),
            shop_products = report.shop_products,
            skipped_children = report.skipped_children,
            "Product indexed"
        );
        Ok(report)
    }

    /// Index a single shop product row.
    #[instrument(skip_all, fields(shop_product = %shop_product_id))]
    pub async fn index_shop_product(
        &self,
        shop_product_id: ShopProductId,
    ) -> Result<IndexReport, IndexError> {
        let started_at = Instant::now();
        let shop_product = self
            .reader
            .find_shop_product(shop_product_id)
            .await?
            .ok_or(IndexError::ShopProductNotFound(shop_product_id))?;
        let product = self
            .reader
            .find_product(shop_product.product_id)
            .await?
            .ok_or(IndexError::ProductNotFound(shop_product.product_id))?;

        self.write_rows(&product, &shop_product).await?;
        let mut report = IndexReport {
            shop_products: 1,
            ..IndexReport::default()
        };
        report.merge(
            self.refresh_package_parents(product.id, Some(shop_product.shop_id))
                .await?,
        );

        histogram!(METRIC_INDEX_MS, "op" => "shop_product")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(report)
    }

    /// Walk every shop product of `shop` with bounded concurrency.
    ///
    /// Stops at the first failing row; rows indexed before it keep their new
    /// values, which is safe because indexing is idempotent.
    #[instrument(skip_all, fields(shop = %shop))]
    pub async fn reindex_all(&self, shop: ShopId) -> Result<IndexReport, IndexError> {
        let started_at = Instant::now();
        let ids = self.reader.shop_product_ids_for_shop(shop).await?;
        let total = ids.len();
        let indexed = AtomicUsize::new(0);

        info!(
            target = SOURCE,
            total,
            concurrency = self.reindex_concurrency,
            "Reindex starting"
        );

        stream::iter(ids.into_iter().map(Ok::<_, IndexError>))
            .try_for_each_concurrent(Some(self.reindex_concurrency), |id| {
                let indexed = &indexed;
                async move {
                    self.index_shop_product(id).await?;
                    indexed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
            .await?;

        let count = indexed.load(Ordering::Relaxed);
        histogram!(METRIC_INDEX_MS, "op" => "reindex_all")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(target = SOURCE, shop_products = count, "Reindex complete");

        Ok(IndexReport {
            shop_products: count,
            ..IndexReport::default()
        })
    }

    async fn index_own_rows(&self, product: &ProductRecord) -> Result<IndexReport, IndexError> {
        let shop_products = self
            .reader
            .shop_products_for_products(&[product.id], None)
            .await?;
        for shop_product in &shop_products {
            self.write_rows(product, shop_product).await?;
        }
        Ok(IndexReport {
            products: 1,
            shop_products: shop_products.len(),
            ..IndexReport::default()
        })
    }

    async fn index_variation_children(
        &self,
        parent: &ProductRecord,
    ) -> Result<IndexReport, IndexError> {
        let mut report = IndexReport::default();
        for child_id in self.reader.variation_children(parent.id).await? {
            let Some(child) = self.reader.find_product(child_id).await? else {
                warn!(
                    target = SOURCE,
                    parent = %parent.id,
                    child = %child_id,
                    "Variation child disappeared during indexing"
                );
                report.skipped_children += 1;
                continue;
            };
            if child.variation_parent_id != Some(parent.id) {
                warn!(
                    target = SOURCE,
                    parent = %parent.id,
                    child = %child.id,
                    "Variation child moved to another parent during indexing"
                );
                report.skipped_children += 1;
                continue;
            }
            report.merge(self.index_own_rows(&child).await?);
            report.merge(self.refresh_package_parents(child.id, None).await?);
        }
        Ok(report)
    }

    /// Refresh every package that links `component`, whatever its mode.
    async fn refresh_package_parents(
        &self,
        component: ProductId,
        shop: Option<ShopId>,
    ) -> Result<IndexReport, IndexError> {
        let mut report = IndexReport::default();
        for parent_id in self.reader.package_parents(component).await? {
            if parent_id == component {
                continue;
            }
            report.merge(self.refresh_package_availability(parent_id, shop).await?);
        }
        Ok(report)
    }

    /// Recompute only the availability flag of a package parent's rows.
    async fn refresh_package_availability(
        &self,
        parent_id: ProductId,
        shop: Option<ShopId>,
    ) -> Result<IndexReport, IndexError> {
        let Some(parent) = self.reader.find_product(parent_id).await? else {
            warn!(
                target = SOURCE,
                parent = %parent_id,
                "Package parent disappeared during indexing"
            );
            return Ok(IndexReport::default());
        };

        let shop_products = self
            .reader
            .shop_products_for_products(&[parent.id], shop)
            .await?;
        for shop_product in &shop_products {
            let purchasable = self.purchasable(&parent, shop_product).await?;
            self.writer
                .set_purchasable(shop_product.id, purchasable)
                .await?;
        }
        Ok(IndexReport {
            availability_refreshed: shop_products.len(),
            ..IndexReport::default()
        })
    }

    async fn write_rows(
        &self,
        product: &ProductRecord,
        shop_product: &ShopProductRecord,
    ) -> Result<(), IndexError> {
        let price_rules = self
            .reader
            .price_rules(shop_product.shop_id, product.id)
            .await?;
        let discount_rules = self
            .reader
            .discount_rules(shop_product.shop_id, product.id)
            .await?;
        let scopes =
            pricing::price_scopes(shop_product.default_price, &price_rules, &discount_rules)?;
        let purchasable = self.purchasable(product, shop_product).await?;

        let rows: Vec<CatalogPriceRow> = scopes
            .into_iter()
            .map(|scope| CatalogPriceRow {
                shop_product_id: shop_product.id,
                shop_id: shop_product.shop_id,
                product_id: product.id,
                group_id: scope.group_id,
                price: scope.price.price,
                discounted_price: scope.price.discounted_price,
                purchasable,
            })
            .collect();

        self.writer
            .replace_catalog_prices(shop_product.id, &rows)
            .await?;
        Ok(())
    }

    async fn purchasable(
        &self,
        product: &ProductRecord,
        shop_product: &ShopProductRecord,
    ) -> Result<bool, IndexError> {
        let own = self.row_purchasable(product.id, shop_product).await?;
        if !own {
            return Ok(own);
        }

        let children = self.reader.package_children(product.id).await?;
        if children.is_empty() {
            return Ok(own);
        }
        if children.contains(&product.id) {
            return Err(IndexError::malformed(format!(
                "package {} lists itself as a component",
                product.id
            )));
        }
        let child_rows = self
            .reader
            .shop_products_for_products(&children, Some(shop_product.shop_id))
            .await?;

        let mut flags = Vec::with_capacity(children.len());
        for child in &children {
            let flag = match child_rows.iter().find(|row| row.product_id == *child) {
                Some(row) => self.row_purchasable(*child, row).await?,
                None => false,
            };
            flags.push(flag);
        }
        Ok(availability::package_is_purchasable(own, flags))
    }

    async fn row_purchasable(
        &self,
        product_id: ProductId,
        shop_product: &ShopProductRecord,
    ) -> Result<bool, IndexError> {
        if !shop_product.visibility.is_visible() {
            return Ok(false);
        }
        let suppliers = self.reader.suppliers(&shop_product.supplier_ids).await?;
        let wanted: BTreeSet<_> = shop_product.supplier_ids.iter().copied().collect();
        let found: BTreeSet<_> = suppliers.iter().map(|supplier| supplier.id).collect();
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(IndexError::MissingReference {
                message: format!(
                    "supplier {missing} referenced by shop product {} does not exist",
                    shop_product.id
                ),
            });
        }
        let stock = self
            .reader
            .stock(product_id, &shop_product.supplier_ids)
            .await?;
        Ok(availability::is_purchasable(shop_product, &suppliers, &stock))
    }
}
