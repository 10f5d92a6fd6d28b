use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    application::repos::{CatalogReadRepo, CatalogWriteRepo, RepoError},
    domain::{
        entities::{
            CatalogListingRow, CatalogPriceRow, DiscountRuleRecord, PriceRuleRecord,
            ProductRecord, ShopProductRecord, StockStatus, SupplierRecord,
        },
        ids::{ManufacturerId, ProductId, ShopId, ShopProductId, SupplierId},
        types::{ProductMode, Visibility},
    },
};

use super::{
    PostgresRepositories,
    util::{ids, map_sqlx_error, raw_ids},
};

const SHOP_PRODUCT_COLUMNS: &str = r#"
    sp.id, sp.shop_id, sp.product_id, sp.visibility, sp.default_price,
    sp.catalog_price, sp.catalog_discounted_price,
    ARRAY(
        SELECT s.supplier_id FROM shop_product_suppliers s
        WHERE s.shop_product_id = sp.id
        ORDER BY s.supplier_id
    ) AS supplier_ids
"#;

const CATALOG_PRICE_COLUMNS: &str =
    "shop_product_id, shop_id, product_id, group_id, price, discounted_price, purchasable";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    mode: ProductMode,
    variation_parent_id: Option<i64>,
    manufacturer_id: Option<i64>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId(row.id),
            mode: row.mode,
            variation_parent_id: row.variation_parent_id.map(ProductId),
            manufacturer_id: row.manufacturer_id.map(ManufacturerId),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShopProductRow {
    id: i64,
    shop_id: i64,
    product_id: i64,
    visibility: Visibility,
    default_price: Decimal,
    catalog_price: Option<Decimal>,
    catalog_discounted_price: Option<Decimal>,
    supplier_ids: Vec<i64>,
}

impl From<ShopProductRow> for ShopProductRecord {
    fn from(row: ShopProductRow) -> Self {
        Self {
            id: ShopProductId(row.id),
            shop_id: ShopId(row.shop_id),
            product_id: ProductId(row.product_id),
            visibility: row.visibility,
            default_price: row.default_price,
            supplier_ids: ids(row.supplier_ids),
            catalog_price: row.catalog_price,
            catalog_discounted_price: row.catalog_discounted_price,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PriceRuleRow {
    shop_id: i64,
    product_id: i64,
    group_id: Option<i64>,
    override_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct DiscountRuleRow {
    shop_id: i64,
    product_id: i64,
    group_id: i64,
    discount_amount: Decimal,
}

#[derive(sqlx::FromRow)]
struct StockRow {
    supplier_id: i64,
    product_id: i64,
    logical_count: Decimal,
    physical_count: Decimal,
}

#[derive(sqlx::FromRow)]
struct CatalogPriceDbRow {
    shop_product_id: i64,
    shop_id: i64,
    product_id: i64,
    group_id: Option<i64>,
    price: Decimal,
    discounted_price: Option<Decimal>,
    purchasable: bool,
}

impl From<CatalogPriceDbRow> for CatalogPriceRow {
    fn from(row: CatalogPriceDbRow) -> Self {
        Self {
            shop_product_id: ShopProductId(row.shop_product_id),
            shop_id: ShopId(row.shop_id),
            product_id: ProductId(row.product_id),
            group_id: row.group_id.map(Into::into),
            price: row.price,
            discounted_price: row.discounted_price,
            purchasable: row.purchasable,
        }
    }
}

impl PostgresRepositories {
    async fn product_ids(&self, sql: &str, id: i64) -> Result<Vec<ProductId>, RepoError> {
        let rows: Vec<i64> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(ids(rows))
    }
}

#[async_trait]
impl CatalogReadRepo for PostgresRepositories {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, mode, variation_parent_id, manufacturer_id
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRecord::from))
    }

    async fn variation_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.product_ids(
            "SELECT id FROM products WHERE variation_parent_id = $1 ORDER BY id",
            parent.get(),
        )
        .await
    }

    async fn package_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.product_ids(
            r#"
            SELECT child_product_id FROM package_links
            WHERE parent_product_id = $1
            ORDER BY child_product_id
            "#,
            parent.get(),
        )
        .await
    }

    async fn package_parents(&self, child: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.product_ids(
            r#"
            SELECT parent_product_id FROM package_links
            WHERE child_product_id = $1
            ORDER BY parent_product_id
            "#,
            child.get(),
        )
        .await
    }

    async fn find_shop_product(
        &self,
        id: ShopProductId,
    ) -> Result<Option<ShopProductRecord>, RepoError> {
        let sql = format!("SELECT {SHOP_PRODUCT_COLUMNS} FROM shop_products sp WHERE sp.id = $1");
        let row = sqlx::query_as::<_, ShopProductRow>(&sql)
            .bind(id.get())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ShopProductRecord::from))
    }

    async fn shop_products_for_products(
        &self,
        products: &[ProductId],
        shop: Option<ShopId>,
    ) -> Result<Vec<ShopProductRecord>, RepoError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {SHOP_PRODUCT_COLUMNS}
            FROM shop_products sp
            WHERE sp.product_id = ANY($1)
              AND ($2::BIGINT IS NULL OR sp.shop_id = $2)
            ORDER BY sp.id
            "#
        );
        let rows = sqlx::query_as::<_, ShopProductRow>(&sql)
            .bind(raw_ids(products))
            .bind(shop.map(ShopId::get))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ShopProductRecord::from).collect())
    }

    async fn shop_product_ids_for_shop(
        &self,
        shop: ShopId,
    ) -> Result<Vec<ShopProductId>, RepoError> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM shop_products WHERE shop_id = $1 ORDER BY id")
                .bind(shop.get())
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(ids(rows))
    }

    async fn price_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<PriceRuleRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PriceRuleRow>(
            r#"
            SELECT shop_id, product_id, group_id, override_price
            FROM price_rules
            WHERE shop_id = $1 AND product_id = $2
            ORDER BY id
            "#,
        )
        .bind(shop.get())
        .bind(product.get())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| PriceRuleRecord {
                shop_id: ShopId(row.shop_id),
                product_id: ProductId(row.product_id),
                group_id: row.group_id.map(Into::into),
                override_price: row.override_price,
            })
            .collect())
    }

    async fn discount_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<DiscountRuleRecord>, RepoError> {
        let rows = sqlx::query_as::<_, DiscountRuleRow>(
            r#"
            SELECT shop_id, product_id, group_id, discount_amount
            FROM discount_rules
            WHERE shop_id = $1 AND product_id = $2
            ORDER BY id
            "#,
        )
        .bind(shop.get())
        .bind(product.get())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| DiscountRuleRecord {
                shop_id: ShopId(row.shop_id),
                product_id: ProductId(row.product_id),
                group_id: row.group_id.into(),
                discount_amount: row.discount_amount,
            })
            .collect())
    }

    async fn suppliers(&self, ids: &[SupplierId]) -> Result<Vec<SupplierRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(i64, bool)> = sqlx::query_as(
            "SELECT id, stock_managed FROM suppliers WHERE id = ANY($1) ORDER BY id",
        )
        .bind(raw_ids(ids))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, stock_managed)| SupplierRecord {
                id: SupplierId(id),
                stock_managed,
            })
            .collect())
    }

    async fn stock(
        &self,
        product: ProductId,
        suppliers: &[SupplierId],
    ) -> Result<Vec<StockStatus>, RepoError> {
        if suppliers.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT supplier_id, product_id, logical_count, physical_count
            FROM stock_records
            WHERE product_id = $1 AND supplier_id = ANY($2)
            ORDER BY supplier_id
            "#,
        )
        .bind(product.get())
        .bind(raw_ids(suppliers))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| StockStatus {
                supplier_id: SupplierId(row.supplier_id),
                product_id: ProductId(row.product_id),
                logical_count: row.logical_count,
                physical_count: row.physical_count,
            })
            .collect())
    }

    async fn products_for_manufacturer(
        &self,
        manufacturer: ManufacturerId,
    ) -> Result<Vec<ProductId>, RepoError> {
        self.product_ids(
            "SELECT id FROM products WHERE manufacturer_id = $1 ORDER BY id",
            manufacturer.get(),
        )
        .await
    }

    async fn catalog_prices(
        &self,
        shop_product: ShopProductId,
    ) -> Result<Vec<CatalogPriceRow>, RepoError> {
        let sql = format!(
            "SELECT {CATALOG_PRICE_COLUMNS} FROM catalog_prices \
             WHERE shop_product_id = $1 ORDER BY group_id NULLS FIRST"
        );
        let rows = sqlx::query_as::<_, CatalogPriceDbRow>(&sql)
            .bind(shop_product.get())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CatalogPriceRow::from).collect())
    }

    async fn catalog_listing(&self, shop: ShopId) -> Result<Vec<CatalogListingRow>, RepoError> {
        let listed: Vec<(i64, i64, Visibility)> = sqlx::query_as(
            r#"
            SELECT id, product_id, visibility
            FROM shop_products
            WHERE shop_id = $1
            ORDER BY id
            "#,
        )
        .bind(shop.get())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let sql = format!(
            "SELECT {CATALOG_PRICE_COLUMNS} FROM catalog_prices \
             WHERE shop_id = $1 ORDER BY shop_product_id, group_id NULLS FIRST"
        );
        let rows = sqlx::query_as::<_, CatalogPriceDbRow>(&sql)
            .bind(shop.get())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut scopes: BTreeMap<ShopProductId, Vec<CatalogPriceRow>> = BTreeMap::new();
        for row in rows {
            let row = CatalogPriceRow::from(row);
            scopes.entry(row.shop_product_id).or_default().push(row);
        }

        // Rows never indexed have no scopes and stay out of listings.
        Ok(listed
            .into_iter()
            .filter_map(|(id, product_id, visibility)| {
                let shop_product_id = ShopProductId(id);
                let scopes = scopes.remove(&shop_product_id)?;
                Some(CatalogListingRow {
                    shop_product_id,
                    product_id: ProductId(product_id),
                    visibility,
                    scopes,
                })
            })
            .collect())
    }
}

#[async_trait]
impl CatalogWriteRepo for PostgresRepositories {
    async fn replace_catalog_prices(
        &self,
        shop_product: ShopProductId,
        rows: &[CatalogPriceRow],
    ) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Row lock serializes concurrent indexing of the same shop product.
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM shop_products WHERE id = $1 FOR UPDATE")
                .bind(shop_product.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }

        sqlx::query("DELETE FROM catalog_prices WHERE shop_product_id = $1")
            .bind(shop_product.get())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for row in rows {
            sqlx::query(&format!(
                "INSERT INTO catalog_prices ({CATALOG_PRICE_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(shop_product.get())
            .bind(row.shop_id.get())
            .bind(row.product_id.get())
            .bind(row.group_id.map(i64::from))
            .bind(row.price)
            .bind(row.discounted_price)
            .bind(row.purchasable)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let anonymous = rows.iter().find(|row| row.group_id.is_none());
        sqlx::query(
            r#"
            UPDATE shop_products
            SET catalog_price = $2, catalog_discounted_price = $3
            WHERE id = $1
            "#,
        )
        .bind(shop_product.get())
        .bind(anonymous.map(|row| row.price))
        .bind(anonymous.and_then(|row| row.discounted_price))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_purchasable(
        &self,
        shop_product: ShopProductId,
        purchasable: bool,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE catalog_prices SET purchasable = $2 WHERE shop_product_id = $1")
            .bind(shop_product.get())
            .bind(purchasable)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
