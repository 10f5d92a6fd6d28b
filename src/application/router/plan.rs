//! Dispatch plan generation.
//!
//! Merges catalog events into one plan: what to re-index and what to bump.
//! Identical targets from several events collapse into one action.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::ids::{ManufacturerId, ProductId, ShopId, ShopProductId};

use super::events::CatalogEvent;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Products to run through `index_product`.
    pub index_products: BTreeSet<ProductId>,
    /// Shop products to run through `index_shop_product`.
    pub index_shop_products: BTreeSet<ShopProductId>,
    /// Products to cascade, keyed by the shop the cascade is limited to.
    pub cascade_products: BTreeMap<Option<ShopId>, BTreeSet<ProductId>>,
    /// Shop products whose own product cascades within their shop.
    pub cascade_shop_products: BTreeSet<ShopProductId>,
    /// Manufacturers whose products cascade, keyed like `cascade_products`.
    pub cascade_manufacturers: BTreeMap<Option<ShopId>, BTreeSet<ManufacturerId>>,
    /// Products bumped in the `product` namespace without a cascade.
    pub bump_products: BTreeSet<ProductId>,
    /// Whether cached listings must be dropped.
    pub bump_listings: bool,
}

impl fmt::Display for DispatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DispatchPlan {{ index_products: {}, index_shop_products: {}, cascade_products: {}, \
             cascade_shop_products: {}, cascade_manufacturers: {}, bump_products: {}, \
             bump_listings: {} }}",
            self.index_products.len(),
            self.index_shop_products.len(),
            self.cascade_products.values().map(BTreeSet::len).sum::<usize>(),
            self.cascade_shop_products.len(),
            self.cascade_manufacturers
                .values()
                .map(BTreeSet::len)
                .sum::<usize>(),
            self.bump_products.len(),
            self.bump_listings,
        )
    }
}

impl DispatchPlan {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a CatalogEvent>) -> Self {
        let mut plan = Self::default();
        for event in events {
            plan.add(event);
        }
        plan.bump_listings = !plan.is_empty();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.index_products.is_empty()
            && self.index_shop_products.is_empty()
            && self.cascade_products.is_empty()
            && self.cascade_shop_products.is_empty()
            && self.cascade_manufacturers.is_empty()
            && self.bump_products.is_empty()
    }

    fn add(&mut self, event: &CatalogEvent) {
        match event {
            CatalogEvent::ProductChanged {
                product_ids,
                shop_id,
            }
            | CatalogEvent::StockChanged {
                product_ids,
                shop_id,
            }
            | CatalogEvent::PriceRuleChanged {
                product_ids,
                shop_id,
            } => {
                self.index_products.extend(product_ids.iter().copied());
                self.cascade(*shop_id, product_ids);
            }
            CatalogEvent::ShopProductChanged { shop_product_ids } => {
                self.index_shop_products
                    .extend(shop_product_ids.iter().copied());
                self.cascade_shop_products
                    .extend(shop_product_ids.iter().copied());
            }
            CatalogEvent::ManufacturerChanged {
                manufacturer_id,
                shop_id,
            } => {
                self.cascade_manufacturers
                    .entry(*shop_id)
                    .or_default()
                    .insert(*manufacturer_id);
            }
            CatalogEvent::CrossSellChanged { product_ids } => {
                self.bump_products.extend(product_ids.iter().copied());
            }
            CatalogEvent::MediaChanged {
                product_ids,
                shop_id,
            } => self.cascade(*shop_id, product_ids),
        }
    }

    fn cascade(&mut self, shop_id: Option<ShopId>, product_ids: &[ProductId]) {
        if product_ids.is_empty() {
            return;
        }
        self.cascade_products
            .entry(shop_id)
            .or_default()
            .extend(product_ids.iter().copied());
    }
}
