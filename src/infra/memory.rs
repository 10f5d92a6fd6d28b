//! In-process catalog store.
//!
//! Backs tests and local tooling. Mutators mirror what the surrounding
//! application would do to the row store; they never touch computed columns.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::repos::{CatalogReadRepo, CatalogWriteRepo, RepoError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{
    CatalogListingRow, CatalogPriceRow, DiscountRuleRecord, PriceRuleRecord, ProductRecord,
    ShopProductRecord, StockStatus, SupplierRecord,
};
use crate::domain::ids::{
    GroupId, ManufacturerId, ProductId, ShopId, ShopProductId, SupplierId,
};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductId, ProductRecord>,
    shop_products: BTreeMap<ShopProductId, ShopProductRecord>,
    /// `(parent, child)` pairs.
    package_links: BTreeSet<(ProductId, ProductId)>,
    price_rules: Vec<PriceRuleRecord>,
    discount_rules: Vec<DiscountRuleRecord>,
    suppliers: BTreeMap<SupplierId, SupplierRecord>,
    stock: BTreeMap<(SupplierId, ProductId), StockStatus>,
    catalog_prices: BTreeMap<ShopProductId, Vec<CatalogPriceRow>>,
    fail_relations: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, product: ProductRecord) {
        rw_write(&self.state, SOURCE, "upsert_product")
            .products
            .insert(product.id, product);
    }

    pub fn upsert_shop_product(&self, shop_product: ShopProductRecord) {
        rw_write(&self.state, SOURCE, "upsert_shop_product")
            .shop_products
            .insert(shop_product.id, shop_product);
    }

    pub fn set_default_price(&self, shop_product: ShopProductId, price: Decimal) {
        if let Some(row) = rw_write(&self.state, SOURCE, "set_default_price")
            .shop_products
            .get_mut(&shop_product)
        {
            row.default_price = price;
        }
    }

    pub fn link_package(&self, parent: ProductId, child: ProductId) {
        rw_write(&self.state, SOURCE, "link_package")
            .package_links
            .insert((parent, child));
    }

    pub fn add_price_rule(&self, rule: PriceRuleRecord) {
        rw_write(&self.state, SOURCE, "add_price_rule")
            .price_rules
            .push(rule);
    }

    pub fn add_discount_rule(&self, rule: DiscountRuleRecord) {
        rw_write(&self.state, SOURCE, "add_discount_rule")
            .discount_rules
            .push(rule);
    }

    pub fn remove_discount_rules(&self, shop: ShopId, product: ProductId, group: GroupId) {
        rw_write(&self.state, SOURCE, "remove_discount_rules")
            .discount_rules
            .retain(|rule| {
                !(rule.shop_id == shop && rule.product_id == product && rule.group_id == group)
            });
    }

    pub fn remove_price_rules(&self, shop: ShopId, product: ProductId, group: Option<GroupId>) {
        rw_write(&self.state, SOURCE, "remove_price_rules")
            .price_rules
            .retain(|rule| {
                !(rule.shop_id == shop && rule.product_id == product && rule.group_id == group)
            });
    }

    pub fn upsert_supplier(&self, supplier: SupplierRecord) {
        rw_write(&self.state, SOURCE, "upsert_supplier")
            .suppliers
            .insert(supplier.id, supplier);
    }

    pub fn set_stock(&self, supplier: SupplierId, product: ProductId, logical: Decimal) {
        rw_write(&self.state, SOURCE, "set_stock").stock.insert(
            (supplier, product),
            StockStatus {
                supplier_id: supplier,
                product_id: product,
                logical_count: logical,
                physical_count: logical,
            },
        );
    }

    /// Remove a product with its shop products, links, rules and index rows.
    pub fn delete_product(&self, product: ProductId) {
        let mut state = rw_write(&self.state, SOURCE, "delete_product");
        state.products.remove(&product);
        let removed: Vec<ShopProductId> = state
            .shop_products
            .values()
            .filter(|row| row.product_id == product)
            .map(|row| row.id)
            .collect();
        for id in removed {
            state.shop_products.remove(&id);
            state.catalog_prices.remove(&id);
        }
        state
            .package_links
            .retain(|(parent, child)| *parent != product && *child != product);
        state.price_rules.retain(|rule| rule.product_id != product);
        state.discount_rules.retain(|rule| rule.product_id != product);
    }

    /// Make relation lookups (variations, packages) fail until reset.
    pub fn set_relation_failures(&self, fail: bool) {
        rw_write(&self.state, SOURCE, "set_relation_failures").fail_relations = fail;
    }

    fn relation_guard(&self) -> Result<(), RepoError> {
        if rw_read(&self.state, SOURCE, "relation_guard").fail_relations {
            return Err(RepoError::from_persistence("relation lookup unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogReadRepo for InMemoryCatalog {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_product")
            .products
            .get(&id)
            .cloned())
    }

    async fn variation_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.relation_guard()?;
        Ok(rw_read(&self.state, SOURCE, "variation_children")
            .products
            .values()
            .filter(|product| product.variation_parent_id == Some(parent))
            .map(|product| product.id)
            .collect())
    }

    async fn package_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.relation_guard()?;
        Ok(rw_read(&self.state, SOURCE, "package_children")
            .package_links
            .iter()
            .filter(|(p, _)| *p == parent)
            .map(|(_, child)| *child)
            .collect())
    }

    async fn package_parents(&self, child: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.relation_guard()?;
        Ok(rw_read(&self.state, SOURCE, "package_parents")
            .package_links
            .iter()
            .filter(|(_, c)| *c == child)
            .map(|(parent, _)| *parent)
            .collect())
    }

    async fn find_shop_product(
        &self,
        id: ShopProductId,
    ) -> Result<Option<ShopProductRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_shop_product")
            .shop_products
            .get(&id)
            .cloned())
    }

    async fn shop_products_for_products(
        &self,
        products: &[ProductId],
        shop: Option<ShopId>,
    ) -> Result<Vec<ShopProductRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "shop_products_for_products")
            .shop_products
            .values()
            .filter(|row| products.contains(&row.product_id))
            .filter(|row| shop.is_none_or(|shop| row.shop_id == shop))
            .cloned()
            .collect())
    }

    async fn shop_product_ids_for_shop(
        &self,
        shop: ShopId,
    ) -> Result<Vec<ShopProductId>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "shop_product_ids_for_shop")
            .shop_products
            .values()
            .filter(|row| row.shop_id == shop)
            .map(|row| row.id)
            .collect())
    }

    async fn price_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<PriceRuleRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "price_rules")
            .price_rules
            .iter()
            .filter(|rule| rule.shop_id == shop && rule.product_id == product)
            .cloned()
            .collect())
    }

    async fn discount_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<DiscountRuleRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "discount_rules")
            .discount_rules
            .iter()
            .filter(|rule| rule.shop_id == shop && rule.product_id == product)
            .cloned()
            .collect())
    }

    async fn suppliers(&self, ids: &[SupplierId]) -> Result<Vec<SupplierRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "suppliers");
        Ok(ids
            .iter()
            .filter_map(|id| state.suppliers.get(id).copied())
            .collect())
    }

    async fn stock(
        &self,
        product: ProductId,
        suppliers: &[SupplierId],
    ) -> Result<Vec<StockStatus>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "stock");
        Ok(suppliers
            .iter()
            .filter_map(|supplier| state.stock.get(&(*supplier, product)).cloned())
            .collect())
    }

    async fn products_for_manufacturer(
        &self,
        manufacturer: ManufacturerId,
    ) -> Result<Vec<ProductId>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "products_for_manufacturer")
            .products
            .values()
            .filter(|product| product.manufacturer_id == Some(manufacturer))
            .map(|product| product.id)
            .collect())
    }

    async fn catalog_prices(
        &self,
        shop_product: ShopProductId,
    ) -> Result<Vec<CatalogPriceRow>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "catalog_prices")
            .catalog_prices
            .get(&shop_product)
            .cloned()
            .unwrap_or_default())
    }

    async fn catalog_listing(&self, shop: ShopId) -> Result<Vec<CatalogListingRow>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "catalog_listing");
        Ok(state
            .shop_products
            .values()
            .filter(|row| row.shop_id == shop)
            .filter_map(|row| {
                let scopes = state.catalog_prices.get(&row.id)?;
                Some(CatalogListingRow {
                    shop_product_id: row.id,
                    product_id: row.product_id,
                    visibility: row.visibility,
                    scopes: scopes.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl CatalogWriteRepo for InMemoryCatalog {
    async fn replace_catalog_prices(
        &self,
        shop_product: ShopProductId,
        rows: &[CatalogPriceRow],
    ) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "replace_catalog_prices");
        let anonymous = rows.iter().find(|row| row.group_id.is_none()).cloned();
        let record = state
            .shop_products
            .get_mut(&shop_product)
            .ok_or(RepoError::NotFound)?;
        record.catalog_price = anonymous.as_ref().map(|row| row.price);
        record.catalog_discounted_price = anonymous.and_then(|row| row.discounted_price);
        state.catalog_prices.insert(shop_product, rows.to_vec());
        Ok(())
    }

    async fn set_purchasable(
        &self,
        shop_product: ShopProductId,
        purchasable: bool,
    ) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "set_purchasable");
        if let Some(rows) = state.catalog_prices.get_mut(&shop_product) {
            for row in rows {
                row.purchasable = purchasable;
            }
        }
        Ok(())
    }
}
