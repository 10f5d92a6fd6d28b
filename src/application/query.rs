//! Read paths over indexed catalog rows.
//!
//! Nothing here evaluates price rules; every number comes from rows written by
//! [`crate::application::indexer::CatalogIndexer`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::application::repos::{CatalogReadRepo, RepoError};
use crate::cache::{CacheContext, ContextCache, Namespace};
use crate::domain::entities::CatalogListingRow;
use crate::domain::ids::{GroupId, ProductId, ShopProductId};
use crate::domain::pricing::{self, CatalogPrice};
use crate::domain::types::Surface;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("shop product `{0}` not found")]
    ShopProductNotFound(ShopProductId),
    #[error("shop product `{0}` has not been indexed")]
    NotIndexed(ShopProductId),
    #[error("catalog queries require a shop in the context")]
    MissingShop,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One row of a filtered catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub shop_product_id: ShopProductId,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub purchasable: bool,
}

impl CatalogEntry {
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilters {
    pub surface: Option<Surface>,
    /// Inclusive bounds on the effective price.
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub purchasable_only: bool,
    pub discounted_only: bool,
}

impl CatalogFilters {
    fn signature(&self) -> String {
        let mut out = String::new();
        let surface = match self.surface {
            Some(Surface::Listing) => "listing",
            Some(Surface::Search) => "search",
            None => "any",
        };
        let _ = write!(
            out,
            "surface={surface};min={};max={};purchasable={};discounted={}",
            self.min_price.map(|v| v.normalize().to_string()).unwrap_or_default(),
            self.max_price.map(|v| v.normalize().to_string()).unwrap_or_default(),
            self.purchasable_only,
            self.discounted_only,
        );
        out
    }

    fn accepts(&self, listing: &CatalogListingRow, entry: &CatalogEntry) -> bool {
        if let Some(surface) = self.surface {
            if !listing.visibility.shows_on(surface) {
                return false;
            }
        }
        let effective = entry.effective_price();
        if self.min_price.is_some_and(|min| effective < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| effective > max) {
            return false;
        }
        if self.purchasable_only && !entry.purchasable {
            return false;
        }
        !(self.discounted_only && entry.discounted_price.is_none())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogSort {
    #[default]
    ProductId,
    PriceAsc,
    PriceDesc,
}

impl CatalogSort {
    fn as_str(self) -> &'static str {
        match self {
            CatalogSort::ProductId => "product_id",
            CatalogSort::PriceAsc => "price_asc",
            CatalogSort::PriceDesc => "price_desc",
        }
    }

    fn apply(self, rows: &mut [CatalogEntry]) {
        match self {
            CatalogSort::ProductId => rows.sort_by_key(|row| (row.product_id, row.shop_product_id)),
            CatalogSort::PriceAsc => {
                rows.sort_by(|a, b| {
                    a.effective_price()
                        .cmp(&b.effective_price())
                        .then(a.product_id.cmp(&b.product_id))
                });
            }
            CatalogSort::PriceDesc => {
                rows.sort_by(|a, b| {
                    b.effective_price()
                        .cmp(&a.effective_price())
                        .then(a.product_id.cmp(&b.product_id))
                });
            }
        }
    }
}

/// Extra listing stage registered at startup. Stages run in registration order
/// after the built-in filters.
pub trait CatalogFilter: Send + Sync {
    /// Stable rendering of the stage and its parameters. Part of the listing
    /// cache key, so two stages that can filter differently must differ here.
    fn signature(&self) -> String;

    fn should_apply(&self, context: &CacheContext) -> bool;

    fn apply(&self, context: &CacheContext, rows: Vec<CatalogEntry>) -> Vec<CatalogEntry>;
}

/// Hides products that are restricted to particular customer groups from
/// shoppers outside those groups.
#[derive(Debug, Clone, Default)]
pub struct VisibleToGroupsFilter {
    restricted: BTreeMap<ProductId, BTreeSet<GroupId>>,
}

impl VisibleToGroupsFilter {
    pub fn new(restricted: BTreeMap<ProductId, BTreeSet<GroupId>>) -> Self {
        Self { restricted }
    }
}

impl CatalogFilter for VisibleToGroupsFilter {
    fn signature(&self) -> String {
        let mut out = String::from("visible_to_groups(");
        for (product, groups) in &self.restricted {
            let groups: Vec<String> = groups.iter().map(ToString::to_string).collect();
            let _ = write!(out, "{product}:{};", groups.join(","));
        }
        out.push(')');
        out
    }

    fn should_apply(&self, _context: &CacheContext) -> bool {
        !self.restricted.is_empty()
    }

    fn apply(&self, context: &CacheContext, rows: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        rows.into_iter()
            .filter(|row| match self.restricted.get(&row.product_id) {
                Some(groups) => !groups.is_disjoint(&context.group_ids),
                None => true,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct CatalogQuery {
    reader: Arc<dyn CatalogReadRepo>,
    cache: Option<ContextCache>,
    filters: Vec<Arc<dyn CatalogFilter>>,
}

impl CatalogQuery {
    pub fn new(reader: Arc<dyn CatalogReadRepo>) -> Self {
        Self {
            reader,
            cache: None,
            filters: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn CatalogFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Anonymous price pair stored on the shop product.
    pub async fn get_catalog_price(
        &self,
        shop_product_id: ShopProductId,
    ) -> Result<CatalogPrice, QueryError> {
        let shop_product = self
            .reader
            .find_shop_product(shop_product_id)
            .await?
            .ok_or(QueryError::ShopProductNotFound(shop_product_id))?;
        let price = shop_product
            .catalog_price
            .ok_or(QueryError::NotIndexed(shop_product_id))?;
        Ok(CatalogPrice {
            price,
            discounted_price: shop_product.catalog_discounted_price,
        })
    }

    /// Price pair for the shopper described by `context`.
    #[instrument(skip_all, fields(shop_product = %shop_product_id))]
    pub async fn catalog_price_for(
        &self,
        shop_product_id: ShopProductId,
        context: &CacheContext,
    ) -> Result<CatalogPrice, QueryError> {
        let identifier = shop_product_id.to_string();
        let key = match &self.cache {
            Some(cache) => {
                let (key, cached) = cache
                    .get::<CatalogPrice>(Namespace::SHOP_PRODUCT, &identifier, context, true)
                    .await;
                if let Some(price) = cached {
                    return Ok(price);
                }
                Some(key)
            }
            None => None,
        };

        let rows = self.reader.catalog_prices(shop_product_id).await?;
        if rows.is_empty() && self.reader.find_shop_product(shop_product_id).await?.is_none() {
            return Err(QueryError::ShopProductNotFound(shop_product_id));
        }
        let price = pricing::resolve_for_groups(&rows, &context.group_ids)
            .ok_or(QueryError::NotIndexed(shop_product_id))?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.set(&key, &price, None).await;
        }
        Ok(price)
    }

    /// Visible catalog rows of the context's shop, resolved for its groups,
    /// filtered and sorted.
    #[instrument(skip_all, fields(sort = sort.as_str()))]
    pub async fn filter_catalog(
        &self,
        context: &CacheContext,
        filters: &CatalogFilters,
        sort: CatalogSort,
    ) -> Result<Vec<CatalogEntry>, QueryError> {
        let shop = context.shop_id.ok_or(QueryError::MissingShop)?;
        let identifier = format!(
            "{};sort={};stages={}",
            filters.signature(),
            sort.as_str(),
            self.stage_signature()
        );
        let key = match &self.cache {
            Some(cache) => {
                let (key, cached) = cache
                    .get::<Vec<CatalogEntry>>(
                        Namespace::CATALOG_LISTING,
                        &identifier,
                        context,
                        true,
                    )
                    .await;
                if let Some(rows) = cached {
                    return Ok(rows);
                }
                Some(key)
            }
            None => None,
        };

        let listing = self.reader.catalog_listing(shop).await?;
        let mut rows: Vec<CatalogEntry> = listing
            .iter()
            .filter(|row| row.visibility.is_visible())
            .filter_map(|row| {
                let price = pricing::resolve_for_groups(&row.scopes, &context.group_ids)?;
                let purchasable = row
                    .scopes
                    .iter()
                    .find(|scope| scope.group_id.is_none())
                    .is_some_and(|scope| scope.purchasable);
                let entry = CatalogEntry {
                    product_id: row.product_id,
                    shop_product_id: row.shop_product_id,
                    price: price.price,
                    discounted_price: price.discounted_price,
                    purchasable,
                };
                filters.accepts(row, &entry).then_some(entry)
            })
            .collect();

        for filter in &self.filters {
            if filter.should_apply(context) {
                rows = filter.apply(context, rows);
            }
        }
        sort.apply(&mut rows);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.set(&key, &rows, None).await;
        }
        Ok(rows)
    }

    fn stage_signature(&self) -> String {
        let stages: Vec<String> = self.filters.iter().map(|stage| stage.signature()).collect();
        stages.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::indexer::CatalogIndexer;
    use crate::application::repos::CatalogWriteRepo;
    use crate::cache::CacheConfig;
    use crate::domain::entities::{DiscountRuleRecord, ProductRecord, ShopProductRecord};
    use crate::domain::ids::ShopId;
    use crate::domain::types::{ProductMode, Visibility};
    use crate::infra::memory::InMemoryCatalog;

    fn entry(product: i64, price: i64, discounted: Option<i64>) -> CatalogEntry {
        CatalogEntry {
            product_id: ProductId(product),
            shop_product_id: ShopProductId(product * 10),
            price: Decimal::from(price),
            discounted_price: discounted.map(Decimal::from),
            purchasable: true,
        }
    }

    async fn seeded() -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new());
        for (id, price) in [(1, 40), (2, 10), (3, 25)] {
            catalog.upsert_product(ProductRecord {
                id: ProductId(id),
                mode: ProductMode::Normal,
                variation_parent_id: None,
                manufacturer_id: None,
            });
            catalog.upsert_shop_product(ShopProductRecord {
                id: ShopProductId(id * 10),
                shop_id: ShopId(1),
                product_id: ProductId(id),
                visibility: Visibility::AlwaysVisible,
                default_price: Decimal::from(price),
                supplier_ids: Vec::new(),
                catalog_price: None,
                catalog_discounted_price: None,
            });
        }
        catalog.add_discount_rule(DiscountRuleRecord {
            shop_id: ShopId(1),
            product_id: ProductId(1),
            group_id: GroupId(5),
            discount_amount: Decimal::from(35),
        });

        let reader: Arc<dyn CatalogReadRepo> = catalog.clone();
        let writer: Arc<dyn CatalogWriteRepo> = catalog.clone();
        CatalogIndexer::new(reader, writer, 2)
            .reindex_all(ShopId(1))
            .await
            .expect("reindex");
        catalog
    }

    #[test]
    fn sort_orders_by_effective_price() {
        let mut rows = vec![entry(1, 40, Some(5)), entry(2, 10, None), entry(3, 25, None)];

        CatalogSort::PriceAsc.apply(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        CatalogSort::PriceDesc.apply(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        CatalogSort::ProductId.apply(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn filter_signature_ignores_decimal_scale() {
        let a = CatalogFilters {
            min_price: Some(Decimal::new(1000, 2)),
            ..CatalogFilters::default()
        };
        let b = CatalogFilters {
            min_price: Some(Decimal::from(10)),
            ..CatalogFilters::default()
        };
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), CatalogFilters::default().signature());
    }

    #[tokio::test]
    async fn price_range_applies_to_effective_price() {
        let catalog = seeded().await;
        let query = CatalogQuery::new(catalog);
        let filters = CatalogFilters {
            max_price: Some(Decimal::from(20)),
            ..CatalogFilters::default()
        };

        let anonymous = query
            .filter_catalog(&CacheContext::anonymous(ShopId(1)), &filters, CatalogSort::PriceAsc)
            .await
            .expect("anonymous");
        let ids: Vec<i64> = anonymous.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![2]);

        let member = query
            .filter_catalog(
                &CacheContext::for_groups(ShopId(1), [GroupId(5)]),
                &filters,
                CatalogSort::PriceAsc,
            )
            .await
            .expect("member");
        let ids: Vec<i64> = member.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn registered_filters_run_after_builtins() {
        let catalog = seeded().await;
        let restricted = BTreeMap::from([(ProductId(3), BTreeSet::from([GroupId(9)]))]);
        let query = CatalogQuery::new(catalog)
            .with_filter(Arc::new(VisibleToGroupsFilter::new(restricted)));

        let outsider = query
            .filter_catalog(
                &CacheContext::anonymous(ShopId(1)),
                &CatalogFilters::default(),
                CatalogSort::ProductId,
            )
            .await
            .expect("outsider");
        assert!(outsider.iter().all(|row| row.product_id != ProductId(3)));

        let member = query
            .filter_catalog(
                &CacheContext::for_groups(ShopId(1), [GroupId(9)]),
                &CatalogFilters::default(),
                CatalogSort::ProductId,
            )
            .await
            .expect("member");
        assert!(member.iter().any(|row| row.product_id == ProductId(3)));
    }

    #[tokio::test]
    async fn queries_with_different_stages_do_not_share_listings() {
        let catalog = seeded().await;
        let cache = ContextCache::in_memory(CacheConfig::default());
        let plain = CatalogQuery::new(catalog.clone()).with_cache(cache.clone());
        let restricted = BTreeMap::from([(ProductId(3), BTreeSet::from([GroupId(9)]))]);
        let filtered = CatalogQuery::new(catalog)
            .with_cache(cache)
            .with_filter(Arc::new(VisibleToGroupsFilter::new(restricted)));
        let context = CacheContext::anonymous(ShopId(1));

        let all = plain
            .filter_catalog(&context, &CatalogFilters::default(), CatalogSort::ProductId)
            .await
            .expect("plain");
        assert_eq!(all.len(), 3);

        let visible = filtered
            .filter_catalog(&context, &CatalogFilters::default(), CatalogSort::ProductId)
            .await
            .expect("filtered");
        let ids: Vec<i64> = visible.iter().map(|row| row.product_id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn listing_requires_a_shop() {
        let query = CatalogQuery::new(Arc::new(InMemoryCatalog::new()));
        let err = query
            .filter_catalog(
                &CacheContext::default(),
                &CatalogFilters::default(),
                CatalogSort::default(),
            )
            .await
            .expect_err("no shop");
        assert!(matches!(err, QueryError::MissingShop));
    }

    #[tokio::test]
    async fn unknown_shop_product_is_not_found() {
        let query = CatalogQuery::new(Arc::new(InMemoryCatalog::new()));
        let err = query
            .catalog_price_for(ShopProductId(1), &CacheContext::anonymous(ShopId(1)))
            .await
            .expect_err("missing");
        assert!(matches!(err, QueryError::ShopProductNotFound(ShopProductId(1))));
    }
}
