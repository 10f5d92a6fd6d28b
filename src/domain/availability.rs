use rust_decimal::Decimal;

use super::entities::{ShopProductRecord, StockStatus, SupplierRecord};

/// Whether the suppliers of a shop product can fulfil an order.
///
/// No suppliers, or any supplier that does not manage stock, means orderable.
/// Stock-managing suppliers need a positive logical count.
pub fn stock_allows_orders(suppliers: &[SupplierRecord], stock: &[StockStatus]) -> bool {
    if suppliers.is_empty() {
        return true;
    }
    suppliers.iter().any(|supplier| {
        !supplier.stock_managed
            || stock.iter().any(|status| {
                status.supplier_id == supplier.id && status.logical_count > Decimal::ZERO
            })
    })
}

/// Availability gate for a single shop product row.
pub fn is_purchasable(
    shop_product: &ShopProductRecord,
    suppliers: &[SupplierRecord],
    stock: &[StockStatus],
) -> bool {
    shop_product.visibility.is_visible() && stock_allows_orders(suppliers, stock)
}

/// Package parents need every component to be purchasable in the same shop.
/// A package without components is judged on its own row only.
pub fn package_is_purchasable(own: bool, children: impl IntoIterator<Item = bool>) -> bool {
    own && children.into_iter().all(|child| child)
}
