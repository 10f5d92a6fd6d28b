use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{GroupId, ManufacturerId, ProductId, ShopId, ShopProductId, SupplierId};
use super::types::{ProductMode, Visibility};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub mode: ProductMode,
    pub variation_parent_id: Option<ProductId>,
    pub manufacturer_id: Option<ManufacturerId>,
}

/// Per-shop facet of a product. `catalog_price` and `catalog_discounted_price`
/// are written only by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopProductRecord {
    pub id: ShopProductId,
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub visibility: Visibility,
    pub default_price: Decimal,
    pub supplier_ids: Vec<SupplierId>,
    pub catalog_price: Option<Decimal>,
    pub catalog_discounted_price: Option<Decimal>,
}

/// Price override. `group_id = None` applies to every shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRuleRecord {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub group_id: Option<GroupId>,
    pub override_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRuleRecord {
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub group_id: GroupId,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    pub id: SupplierId,
    pub stock_managed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStatus {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub logical_count: Decimal,
    pub physical_count: Decimal,
}

/// One indexed price scope for a shop product. `group_id = None` is the
/// anonymous scope mirrored into the shop product columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPriceRow {
    pub shop_product_id: ShopProductId,
    pub shop_id: ShopId,
    pub product_id: ProductId,
    pub group_id: Option<GroupId>,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub purchasable: bool,
}

/// Row handed to listing queries: one anonymous row joined with visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogListingRow {
    pub shop_product_id: ShopProductId,
    pub product_id: ProductId,
    pub visibility: Visibility,
    pub scopes: Vec<CatalogPriceRow>,
}
