//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    CatalogListingRow, CatalogPriceRow, DiscountRuleRecord, PriceRuleRecord, ProductRecord,
    ShopProductRecord, StockStatus, SupplierRecord,
};
use crate::domain::ids::{ManufacturerId, ProductId, ShopId, ShopProductId, SupplierId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read side of the product hierarchy and rule tables.
#[async_trait]
pub trait CatalogReadRepo: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, RepoError>;

    /// Current variation children of `parent`, read at call time.
    async fn variation_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError>;

    async fn package_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError>;

    async fn package_parents(&self, child: ProductId) -> Result<Vec<ProductId>, RepoError>;

    async fn find_shop_product(
        &self,
        id: ShopProductId,
    ) -> Result<Option<ShopProductRecord>, RepoError>;

    /// Shop products of the given products, optionally restricted to one shop.
    async fn shop_products_for_products(
        &self,
        products: &[ProductId],
        shop: Option<ShopId>,
    ) -> Result<Vec<ShopProductRecord>, RepoError>;

    async fn shop_product_ids_for_shop(&self, shop: ShopId)
    -> Result<Vec<ShopProductId>, RepoError>;

    async fn price_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<PriceRuleRecord>, RepoError>;

    async fn discount_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<DiscountRuleRecord>, RepoError>;

    async fn suppliers(&self, ids: &[SupplierId]) -> Result<Vec<SupplierRecord>, RepoError>;

    async fn stock(
        &self,
        product: ProductId,
        suppliers: &[SupplierId],
    ) -> Result<Vec<StockStatus>, RepoError>;

    async fn products_for_manufacturer(
        &self,
        manufacturer: ManufacturerId,
    ) -> Result<Vec<ProductId>, RepoError>;

    /// Stored scope rows for one shop product.
    async fn catalog_prices(
        &self,
        shop_product: ShopProductId,
    ) -> Result<Vec<CatalogPriceRow>, RepoError>;

    /// Every indexed shop product of a shop with its stored scope rows.
    async fn catalog_listing(&self, shop: ShopId) -> Result<Vec<CatalogListingRow>, RepoError>;
}

/// Write side reserved for the indexer.
#[async_trait]
pub trait CatalogWriteRepo: Send + Sync {
    /// Replaces every scope row of `shop_product` and mirrors the anonymous
    /// row into the shop product's catalog columns, in one unit of work.
    async fn replace_catalog_prices(
        &self,
        shop_product: ShopProductId,
        rows: &[CatalogPriceRow],
    ) -> Result<(), RepoError>;

    async fn set_purchasable(
        &self,
        shop_product: ShopProductId,
        purchasable: bool,
    ) -> Result<(), RepoError>;
}
