//! Typed catalog mutation events.

use serde::{Deserialize, Serialize};

use crate::domain::ids::{ManufacturerId, ProductId, ShopId, ShopProductId};

/// A data mutation reported by the surrounding application. Delivery may be
/// repeated; handling is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogEvent {
    ProductChanged {
        product_ids: Vec<ProductId>,
        #[serde(default)]
        shop_id: Option<ShopId>,
    },
    ShopProductChanged {
        shop_product_ids: Vec<ShopProductId>,
    },
    StockChanged {
        product_ids: Vec<ProductId>,
        #[serde(default)]
        shop_id: Option<ShopId>,
    },
    PriceRuleChanged {
        product_ids: Vec<ProductId>,
        #[serde(default)]
        shop_id: Option<ShopId>,
    },
    ManufacturerChanged {
        manufacturer_id: ManufacturerId,
        #[serde(default)]
        shop_id: Option<ShopId>,
    },
    /// Both ends of the changed cross-sell links.
    CrossSellChanged {
        product_ids: Vec<ProductId>,
    },
    MediaChanged {
        product_ids: Vec<ProductId>,
        #[serde(default)]
        shop_id: Option<ShopId>,
    },
}

impl CatalogEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogEvent::ProductChanged { .. } => "product_changed",
            CatalogEvent::ShopProductChanged { .. } => "shop_product_changed",
            CatalogEvent::StockChanged { .. } => "stock_changed",
            CatalogEvent::PriceRuleChanged { .. } => "price_rule_changed",
            CatalogEvent::ManufacturerChanged { .. } => "manufacturer_changed",
            CatalogEvent::CrossSellChanged { .. } => "cross_sell_changed",
            CatalogEvent::MediaChanged { .. } => "media_changed",
        }
    }

    pub fn product_changed(product_ids: impl IntoIterator<Item = ProductId>) -> Self {
        CatalogEvent::ProductChanged {
            product_ids: product_ids.into_iter().collect(),
            shop_id: None,
        }
    }

    pub fn price_rule_changed(
        product_ids: impl IntoIterator<Item = ProductId>,
        shop_id: Option<ShopId>,
    ) -> Self {
        CatalogEvent::PriceRuleChanged {
            product_ids: product_ids.into_iter().collect(),
            shop_id,
        }
    }

    pub fn stock_changed(product_ids: impl IntoIterator<Item = ProductId>) -> Self {
        CatalogEvent::StockChanged {
            product_ids: product_ids.into_iter().collect(),
            shop_id: None,
        }
    }
}
