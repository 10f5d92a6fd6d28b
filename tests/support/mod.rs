#![allow(dead_code)]

use std::sync::Arc;

use catalog_index::application::indexer::CatalogIndexer;
use catalog_index::application::query::CatalogQuery;
use catalog_index::application::repos::{CatalogReadRepo, CatalogWriteRepo};
use catalog_index::application::router::InvalidationRouter;
use catalog_index::cache::{CacheConfig, ContextCache};
use catalog_index::domain::entities::{
    DiscountRuleRecord, PriceRuleRecord, ProductRecord, ShopProductRecord, SupplierRecord,
};
use catalog_index::domain::ids::{GroupId, ProductId, ShopId, ShopProductId, SupplierId};
use catalog_index::domain::types::{ProductMode, Visibility};
use catalog_index::infra::memory::InMemoryCatalog;
use rust_decimal::Decimal;

pub const SHOP: ShopId = ShopId(1);
pub const OTHER_SHOP: ShopId = ShopId(2);

pub struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub indexer: CatalogIndexer,
    pub cache: ContextCache,
    pub query: CatalogQuery,
    pub router: InvalidationRouter,
}

impl Harness {
    pub fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let reader: Arc<dyn CatalogReadRepo> = catalog.clone();
        let writer: Arc<dyn CatalogWriteRepo> = catalog.clone();
        let cache = ContextCache::in_memory(CacheConfig::default());
        let indexer = CatalogIndexer::new(reader.clone(), writer, 4);
        let query = CatalogQuery::new(reader.clone()).with_cache(cache.clone());
        let router = InvalidationRouter::new(reader, indexer.clone(), cache.clone());
        Self {
            catalog,
            indexer,
            cache,
            query,
            router,
        }
    }

    pub fn product(&self, id: i64, mode: ProductMode) -> ProductId {
        self.catalog.upsert_product(ProductRecord {
            id: ProductId(id),
            mode,
            variation_parent_id: None,
            manufacturer_id: None,
        });
        ProductId(id)
    }

    pub fn variation_child(&self, id: i64, parent: ProductId) -> ProductId {
        self.catalog.upsert_product(ProductRecord {
            id: ProductId(id),
            mode: ProductMode::VariationChild,
            variation_parent_id: Some(parent),
            manufacturer_id: None,
        });
        ProductId(id)
    }

    pub fn shop_product(
        &self,
        id: i64,
        shop: ShopId,
        product: ProductId,
        price: i64,
    ) -> ShopProductId {
        self.shop_product_with(id, shop, product, price, Visibility::AlwaysVisible, vec![])
    }

    pub fn shop_product_with(
        &self,
        id: i64,
        shop: ShopId,
        product: ProductId,
        price: i64,
        visibility: Visibility,
        supplier_ids: Vec<SupplierId>,
    ) -> ShopProductId {
        self.catalog.upsert_shop_product(ShopProductRecord {
            id: ShopProductId(id),
            shop_id: shop,
            product_id: product,
            visibility,
            default_price: Decimal::from(price),
            supplier_ids,
            catalog_price: None,
            catalog_discounted_price: None,
        });
        ShopProductId(id)
    }

    pub fn managed_supplier(&self, id: i64) -> SupplierId {
        self.catalog.upsert_supplier(SupplierRecord {
            id: SupplierId(id),
            stock_managed: true,
        });
        SupplierId(id)
    }

    pub fn price_rule(&self, shop: ShopId, product: ProductId, group: Option<GroupId>, price: i64) {
        self.catalog.add_price_rule(PriceRuleRecord {
            shop_id: shop,
            product_id: product,
            group_id: group,
            override_price: Decimal::from(price),
        });
    }

    pub fn discount_rule(&self, shop: ShopId, product: ProductId, group: GroupId, amount: i64) {
        self.catalog.add_discount_rule(DiscountRuleRecord {
            shop_id: shop,
            product_id: product,
            group_id: group,
            discount_amount: Decimal::from(amount),
        });
    }
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}
