mod support;

use std::sync::Arc;

use async_trait::async_trait;
use catalog_index::application::indexer::{CatalogIndexer, IndexError};
use catalog_index::application::query::{CatalogFilters, CatalogSort, QueryError};
use catalog_index::application::repos::{CatalogReadRepo, CatalogWriteRepo, RepoError};
use catalog_index::application::router::{CatalogEvent, DispatchError};
use catalog_index::cache::{CacheContext, Namespace};
use catalog_index::domain::entities::{
    CatalogListingRow, CatalogPriceRow, DiscountRuleRecord, PriceRuleRecord, ProductRecord,
    ShopProductRecord, StockStatus, SupplierRecord,
};
use catalog_index::domain::ids::{
    GroupId, ManufacturerId, ProductId, ShopId, ShopProductId, SupplierId,
};
use catalog_index::domain::pricing::CatalogPrice;
use catalog_index::domain::types::{ProductMode, Surface, Visibility};
use catalog_index::infra::memory::InMemoryCatalog;

use support::{Harness, OTHER_SHOP, SHOP, dec};

const GROUP: GroupId = GroupId(7);

#[tokio::test]
async fn group_prices_follow_rule_changes() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let shop_product = h.shop_product(10, SHOP, product, 30);
    h.price_rule(SHOP, product, Some(GROUP), 25);
    h.discount_rule(SHOP, product, GROUP, 2);

    h.indexer.index_product(product).await.expect("index");

    let anonymous = h
        .query
        .get_catalog_price(shop_product)
        .await
        .expect("anonymous price");
    assert_eq!(
        anonymous,
        CatalogPrice {
            price: dec(30),
            discounted_price: None,
        }
    );

    let group_context = CacheContext::for_groups(SHOP, [GROUP]);
    let member = h
        .query
        .catalog_price_for(shop_product, &group_context)
        .await
        .expect("member price");
    assert_eq!(
        member,
        CatalogPrice {
            price: dec(25),
            discounted_price: Some(dec(23)),
        }
    );

    h.catalog.remove_discount_rules(SHOP, product, GROUP);
    h.router
        .dispatch(&CatalogEvent::price_rule_changed([product], Some(SHOP)))
        .await
        .expect("dispatch");

    let member = h
        .query
        .catalog_price_for(shop_product, &group_context)
        .await
        .expect("member price after removal");
    assert_eq!(member.price, dec(25));
    assert_eq!(member.discounted_price, None);
}

#[tokio::test]
async fn stale_cached_price_survives_until_dispatch() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let shop_product = h.shop_product(10, SHOP, product, 30);
    h.indexer.index_product(product).await.expect("index");

    let context = CacheContext::anonymous(SHOP);
    let before = h
        .query
        .catalog_price_for(shop_product, &context)
        .await
        .expect("price");
    assert_eq!(before.price, dec(30));

    h.catalog.set_default_price(shop_product, dec(40));
    h.indexer.index_product(product).await.expect("reindex");
    let cached = h
        .query
        .catalog_price_for(shop_product, &context)
        .await
        .expect("cached price");
    assert_eq!(cached.price, dec(30));

    h.router
        .dispatch(&CatalogEvent::product_changed([product]))
        .await
        .expect("dispatch");
    let fresh = h
        .query
        .catalog_price_for(shop_product, &context)
        .await
        .expect("fresh price");
    assert_eq!(fresh.price, dec(40));
}

#[tokio::test]
async fn indexing_twice_stores_identical_rows() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let shop_product = h.shop_product(10, SHOP, product, 30);
    h.price_rule(SHOP, product, None, 28);
    h.price_rule(SHOP, product, Some(GROUP), 25);
    h.discount_rule(SHOP, product, GroupId(8), 5);

    h.indexer.index_product(product).await.expect("first");
    let first = h.catalog.catalog_prices(shop_product).await.expect("rows");
    h.indexer.index_product(product).await.expect("second");
    let second = h.catalog.catalog_prices(shop_product).await.expect("rows");

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    let anonymous = first
        .iter()
        .find(|row| row.group_id.is_none())
        .expect("anonymous row");
    assert_eq!(anonymous.price, dec(28));
    let discounted = first
        .iter()
        .find(|row| row.group_id == Some(GroupId(8)))
        .expect("discount group row");
    assert_eq!(discounted.price, dec(28));
    assert_eq!(discounted.discounted_price, Some(dec(23)));
}

#[tokio::test]
async fn rules_of_other_shops_are_ignored() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let shop_product = h.shop_product(10, SHOP, product, 30);
    let other = h.shop_product(11, OTHER_SHOP, product, 30);
    h.price_rule(OTHER_SHOP, product, None, 12);

    h.indexer.index_product(product).await.expect("index");

    let own = h.query.get_catalog_price(shop_product).await.expect("own");
    let foreign = h.query.get_catalog_price(other).await.expect("other");
    assert_eq!(own.price, dec(30));
    assert_eq!(foreign.price, dec(12));
}

#[tokio::test]
async fn variation_parent_and_children_are_indexed_independently() {
    let h = Harness::new();
    let parent = h.product(1, ProductMode::VariableVariationParent);
    let first = h.variation_child(2, parent);
    let second = h.variation_child(3, parent);
    let parent_row = h.shop_product(10, SHOP, parent, 100);
    let first_row = h.shop_product(11, SHOP, first, 80);
    let second_row = h.shop_product(12, SHOP, second, 90);

    let report = h.indexer.index_product(parent).await.expect("index");
    assert_eq!(report.products, 3);
    assert_eq!(report.shop_products, 3);
    assert_eq!(report.skipped_children, 0);

    let prices = [
        h.query.get_catalog_price(parent_row).await.expect("parent"),
        h.query.get_catalog_price(first_row).await.expect("first"),
        h.query.get_catalog_price(second_row).await.expect("second"),
    ];
    assert_eq!(
        prices.map(|price| price.price),
        [dec(100), dec(80), dec(90)]
    );
}

#[tokio::test]
async fn variation_child_without_parent_is_malformed() {
    let h = Harness::new();
    let orphan = h.product(5, ProductMode::VariationChild);
    h.shop_product(50, SHOP, orphan, 10);

    let err = h.indexer.index_product(orphan).await.expect_err("orphan");
    assert!(matches!(err, IndexError::MalformedHierarchy { .. }));
}

#[tokio::test]
async fn missing_product_is_reported() {
    let h = Harness::new();
    let err = h
        .indexer
        .index_product(ProductId(404))
        .await
        .expect_err("missing");
    assert!(matches!(err, IndexError::ProductNotFound(ProductId(404))));

    let err = h
        .indexer
        .index_shop_product(ShopProductId(404))
        .await
        .expect_err("missing");
    assert!(matches!(
        err,
        IndexError::ShopProductNotFound(ShopProductId(404))
    ));
}

/// Reader that reports a variation child which no longer exists.
struct VanishingChild {
    inner: Arc<InMemoryCatalog>,
    vanished: ProductId,
}

#[async_trait]
impl CatalogReadRepo for VanishingChild {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, RepoError> {
        self.inner.find_product(id).await
    }

    async fn variation_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        let mut children = self.inner.variation_children(parent).await?;
        children.push(self.vanished);
        Ok(children)
    }

    async fn package_children(&self, parent: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.inner.package_children(parent).await
    }

    async fn package_parents(&self, child: ProductId) -> Result<Vec<ProductId>, RepoError> {
        self.inner.package_parents(child).await
    }

    async fn find_shop_product(
        &self,
        id: ShopProductId,
    ) -> Result<Option<ShopProductRecord>, RepoError> {
        self.inner.find_shop_product(id).await
    }

    async fn shop_products_for_products(
        &self,
        products: &[ProductId],
        shop: Option<ShopId>,
    ) -> Result<Vec<ShopProductRecord>, RepoError> {
        self.inner.shop_products_for_products(products, shop).await
    }

    async fn shop_product_ids_for_shop(
        &self,
        shop: ShopId,
    ) -> Result<Vec<ShopProductId>, RepoError> {
        self.inner.shop_product_ids_for_shop(shop).await
    }

    async fn price_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<PriceRuleRecord>, RepoError> {
        self.inner.price_rules(shop, product).await
    }

    async fn discount_rules(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<Vec<DiscountRuleRecord>, RepoError> {
        self.inner.discount_rules(shop, product).await
    }

    async fn suppliers(&self, ids: &[SupplierId]) -> Result<Vec<SupplierRecord>, RepoError> {
        self.inner.suppliers(ids).await
    }

    async fn stock(
        &self,
        product: ProductId,
        suppliers: &[SupplierId],
    ) -> Result<Vec<StockStatus>, RepoError> {
        self.inner.stock(product, suppliers).await
    }

    async fn products_for_manufacturer(
        &self,
        manufacturer: ManufacturerId,
    ) -> Result<Vec<ProductId>, RepoError> {
        self.inner.products_for_manufacturer(manufacturer).await
    }

    async fn catalog_prices(
        &self,
        shop_product: ShopProductId,
    ) -> Result<Vec<CatalogPriceRow>, RepoError> {
        self.inner.catalog_prices(shop_product).await
    }

    async fn catalog_listing(&self, shop: ShopId) -> Result<Vec<CatalogListingRow>, RepoError> {
        self.inner.catalog_listing(shop).await
    }
}

#[tokio::test]
async fn vanished_variation_child_is_skipped() {
    let h = Harness::new();
    let parent = h.product(1, ProductMode::VariableVariationParent);
    let child = h.variation_child(2, parent);
    h.shop_product(10, SHOP, parent, 100);
    let child_row = h.shop_product(11, SHOP, child, 80);

    let reader: Arc<dyn CatalogReadRepo> = Arc::new(VanishingChild {
        inner: h.catalog.clone(),
        vanished: ProductId(99),
    });
    let writer: Arc<dyn CatalogWriteRepo> = h.catalog.clone();
    let indexer = CatalogIndexer::new(reader, writer, 1);

    let report = indexer.index_product(parent).await.expect("index");
    assert_eq!(report.skipped_children, 1);
    assert_eq!(report.products, 2);
    assert_eq!(
        h.query
            .get_catalog_price(child_row)
            .await
            .expect("child price")
            .price,
        dec(80)
    );
}

#[tokio::test]
async fn stock_gate_controls_purchasability() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let supplier = h.managed_supplier(4);
    let shop_product = h.shop_product_with(
        10,
        SHOP,
        product,
        30,
        Visibility::AlwaysVisible,
        vec![supplier],
    );

    h.indexer.index_product(product).await.expect("index");
    let rows = h.catalog.catalog_prices(shop_product).await.expect("rows");
    assert!(rows.iter().all(|row| !row.purchasable));

    h.catalog.set_stock(supplier, product, dec(3));
    h.indexer.index_product(product).await.expect("reindex");
    let rows = h.catalog.catalog_prices(shop_product).await.expect("rows");
    assert!(rows.iter().all(|row| row.purchasable));
}

#[tokio::test]
async fn hidden_rows_are_never_purchasable() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    let shop_product =
        h.shop_product_with(10, SHOP, product, 30, Visibility::NotVisible, vec![]);

    h.indexer.index_product(product).await.expect("index");
    let rows = h.catalog.catalog_prices(shop_product).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].purchasable);
}

#[tokio::test]
async fn unknown_supplier_is_a_missing_reference() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    h.shop_product_with(
        10,
        SHOP,
        product,
        30,
        Visibility::AlwaysVisible,
        vec![SupplierId(77)],
    );

    let err = h.indexer.index_product(product).await.expect_err("missing");
    assert!(matches!(err, IndexError::MissingReference { .. }));
}

#[tokio::test]
async fn package_availability_follows_its_components() {
    let h = Harness::new();
    let package = h.product(1, ProductMode::PackageParent);
    let component = h.product(2, ProductMode::PackageChild);
    h.catalog.link_package(package, component);
    let supplier = h.managed_supplier(4);
    let package_row = h.shop_product(10, SHOP, package, 50);
    h.shop_product_with(
        11,
        SHOP,
        component,
        20,
        Visibility::AlwaysVisible,
        vec![supplier],
    );

    h.indexer.index_product(package).await.expect("index package");
    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| !row.purchasable));
    assert_eq!(
        h.query
            .get_catalog_price(package_row)
            .await
            .expect("package price")
            .price,
        dec(50)
    );

    h.catalog.set_stock(supplier, component, dec(1));
    let report = h
        .indexer
        .index_product(component)
        .await
        .expect("index component");
    assert_eq!(report.availability_refreshed, 1);

    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| row.purchasable));
}

#[tokio::test]
async fn package_component_missing_from_shop_blocks_package() {
    let h = Harness::new();
    let package = h.product(1, ProductMode::PackageParent);
    let component = h.product(2, ProductMode::PackageChild);
    h.catalog.link_package(package, component);
    let package_row = h.shop_product(10, SHOP, package, 50);
    h.shop_product(11, OTHER_SHOP, component, 20);

    h.indexer.index_product(package).await.expect("index");
    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| !row.purchasable));
}

#[tokio::test]
async fn hiding_a_component_in_the_shop_blocks_the_package() {
    let h = Harness::new();
    let package = h.product(1, ProductMode::PackageParent);
    let component = h.product(2, ProductMode::PackageChild);
    h.catalog.link_package(package, component);
    let package_row = h.shop_product(10, SHOP, package, 50);
    let other_package_row = h.shop_product(12, OTHER_SHOP, package, 50);
    let component_row = h.shop_product(11, SHOP, component, 20);
    h.shop_product(13, OTHER_SHOP, component, 20);

    h.indexer.index_product(package).await.expect("index package");
    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| row.purchasable));

    h.shop_product_with(
        11,
        SHOP,
        component,
        20,
        Visibility::NotVisible,
        vec![],
    );
    let report = h
        .router
        .dispatch(&CatalogEvent::ShopProductChanged {
            shop_product_ids: vec![component_row],
        })
        .await
        .expect("dispatch");
    assert_eq!(report.indexed.availability_refreshed, 1);

    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| !row.purchasable));
    let rows = h
        .catalog
        .catalog_prices(other_package_row)
        .await
        .expect("rows");
    assert!(rows.iter().all(|row| row.purchasable));
}

#[tokio::test]
async fn linked_normal_component_out_of_stock_blocks_the_package() {
    let h = Harness::new();
    let package = h.product(1, ProductMode::PackageParent);
    let component = h.product(2, ProductMode::Normal);
    h.catalog.link_package(package, component);
    let supplier = h.managed_supplier(4);
    let package_row = h.shop_product(10, SHOP, package, 50);
    h.shop_product_with(
        11,
        SHOP,
        component,
        20,
        Visibility::AlwaysVisible,
        vec![supplier],
    );
    h.catalog.set_stock(supplier, component, dec(1));

    h.indexer.index_product(package).await.expect("index package");
    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| row.purchasable));

    h.catalog.set_stock(supplier, component, dec(0));
    h.router
        .dispatch(&CatalogEvent::stock_changed([component]))
        .await
        .expect("dispatch");

    let rows = h.catalog.catalog_prices(package_row).await.expect("rows");
    assert!(rows.iter().all(|row| !row.purchasable));
}

#[tokio::test]
async fn reindex_all_covers_only_the_requested_shop() {
    let h = Harness::new();
    for id in 1..=3 {
        let product = h.product(id, ProductMode::Normal);
        h.shop_product(10 + id, SHOP, product, 10 * id);
    }
    let foreign = h.product(9, ProductMode::Normal);
    let foreign_row = h.shop_product(90, OTHER_SHOP, foreign, 5);

    let report = h.indexer.reindex_all(SHOP).await.expect("reindex");
    assert_eq!(report.shop_products, 3);

    for id in 1..=3 {
        let price = h
            .query
            .get_catalog_price(ShopProductId(10 + id))
            .await
            .expect("indexed");
        assert_eq!(price.price, dec(10 * id));
    }
    let err = h
        .query
        .get_catalog_price(foreign_row)
        .await
        .expect_err("not indexed");
    assert!(matches!(err, QueryError::NotIndexed(_)));
}

#[tokio::test]
async fn reindex_all_stops_at_first_failure() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    h.shop_product_with(
        10,
        SHOP,
        product,
        30,
        Visibility::AlwaysVisible,
        vec![SupplierId(77)],
    );

    let err = h.indexer.reindex_all(SHOP).await.expect_err("failure");
    assert!(matches!(err, IndexError::MissingReference { .. }));
}

#[tokio::test]
async fn filtered_catalog_uses_group_prices() {
    let h = Harness::new();
    let cheap = h.product(1, ProductMode::Normal);
    let pricey = h.product(2, ProductMode::Normal);
    let hidden = h.product(3, ProductMode::Normal);
    let search_only = h.product(4, ProductMode::Normal);
    h.shop_product(10, SHOP, cheap, 20);
    h.shop_product(11, SHOP, pricey, 50);
    h.shop_product_with(12, SHOP, hidden, 1, Visibility::NotVisible, vec![]);
    h.shop_product_with(13, SHOP, search_only, 5, Visibility::Searchable, vec![]);
    h.discount_rule(SHOP, pricey, GROUP, 40);
    h.indexer.reindex_all(SHOP).await.expect("reindex");

    let anonymous = h
        .query
        .filter_catalog(
            &CacheContext::anonymous(SHOP),
            &CatalogFilters {
                surface: Some(Surface::Listing),
                ..CatalogFilters::default()
            },
            CatalogSort::PriceAsc,
        )
        .await
        .expect("anonymous listing");
    assert_eq!(
        anonymous.iter().map(|row| row.product_id).collect::<Vec<_>>(),
        vec![cheap, pricey]
    );

    let member = h
        .query
        .filter_catalog(
            &CacheContext::for_groups(SHOP, [GROUP]),
            &CatalogFilters {
                surface: Some(Surface::Listing),
                ..CatalogFilters::default()
            },
            CatalogSort::PriceAsc,
        )
        .await
        .expect("member listing");
    assert_eq!(
        member.iter().map(|row| row.product_id).collect::<Vec<_>>(),
        vec![pricey, cheap]
    );
    assert_eq!(member[0].discounted_price, Some(dec(10)));

    let discounted = h
        .query
        .filter_catalog(
            &CacheContext::for_groups(SHOP, [GROUP]),
            &CatalogFilters {
                discounted_only: true,
                ..CatalogFilters::default()
            },
            CatalogSort::ProductId,
        )
        .await
        .expect("discounted listing");
    assert_eq!(discounted.len(), 1);
    assert_eq!(discounted[0].product_id, pricey);
}

#[tokio::test]
async fn dispatch_tolerates_deleted_rows() {
    let h = Harness::new();
    let product = h.product(1, ProductMode::Normal);
    h.shop_product(10, SHOP, product, 30);
    h.indexer.index_product(product).await.expect("index");
    h.catalog.delete_product(product);

    let report = h
        .router
        .dispatch_all(&[
            CatalogEvent::product_changed([product]),
            CatalogEvent::ShopProductChanged {
                shop_product_ids: vec![ShopProductId(10)],
            },
        ])
        .await
        .expect("dispatch");

    assert_eq!(report.indexed.shop_products, 0);
    assert!(report.cascade.shop_products.contains(&ShopProductId(10)));
    assert!(report.listings_bumped);
}

#[tokio::test]
async fn failed_reindex_still_invalidates_cache() {
    let h = Harness::new();
    let orphan = h.product(5, ProductMode::VariationChild);
    let context = CacheContext::anonymous(SHOP);
    let (key, _) = h
        .cache
        .get::<String>(Namespace::PRODUCT, &orphan.to_string(), &context, true)
        .await;
    h.cache.set(&key, &"detail".to_string(), None).await;

    let err = h
        .router
        .dispatch(&CatalogEvent::product_changed([orphan]))
        .await
        .expect_err("malformed hierarchy");
    assert!(matches!(
        err,
        DispatchError::Index {
            source: IndexError::MalformedHierarchy { .. },
            ..
        }
    ));

    let (_, cached) = h
        .cache
        .get::<String>(Namespace::PRODUCT, &orphan.to_string(), &context, true)
        .await;
    assert_eq!(cached, None);
}
