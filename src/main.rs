use std::{process, sync::Arc};

use catalog_index::{
    application::{
        error::AppError,
        indexer::CatalogIndexer,
        query::CatalogQuery,
        repos::{CatalogReadRepo, CatalogWriteRepo},
        router::{CatalogEvent, InvalidationRouter},
    },
    cache::{CacheConfig, CacheContext, ContextCache, Namespace},
    config::{self, CacheBackendKind},
    domain::ids::{GroupId, ProductId, ShopId, ShopProductId},
    infra::{
        db::{PostgresCacheBackend, PostgresRepositories},
        error::InfraError,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::validation(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Reindex(args) => run_reindex(settings, args).await,
        config::Command::Index(args) => run_index(settings, args).await,
        config::Command::Price(args) => run_price(settings, args).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

struct ApplicationContext {
    indexer: CatalogIndexer,
    cache: ContextCache,
    query: CatalogQuery,
    router: InvalidationRouter,
}

async fn run_reindex(settings: config::Settings, args: config::ReindexArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);
    let shop = ShopId::new(args.shop);

    info!(
        target = "catalog_index::reindex",
        shop = %shop,
        concurrency = settings.indexer.reindex_concurrency.get(),
        "Starting reindex"
    );

    let report = app.indexer.reindex_all(shop).await?;
    // Every stored price of the shop may have moved.
    app.cache.bump_namespace(Namespace::SHOP_PRODUCT).await;
    app.cache.bump_namespace(Namespace::CATALOG_LISTING).await;

    info!(
        target = "catalog_index::reindex",
        shop_products = report.shop_products,
        "Reindex finished"
    );
    Ok(())
}

async fn run_index(settings: config::Settings, args: config::IndexArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);
    let product = ProductId::new(args.product);

    let report = app
        .router
        .dispatch(&CatalogEvent::product_changed([product]))
        .await?;

    info!(
        target = "catalog_index::index",
        product = %product,
        shop_products = report.indexed.shop_products,
        bumped_products = report.cascade.products.len(),
        bumped_shop_products = report.cascade.shop_products.len(),
        partial_cascade = report.cascade.partial,
        "Product indexed"
    );
    Ok(())
}

async fn run_price(settings: config::Settings, args: config::PriceArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let shop_product_id = ShopProductId::new(args.shop_product);
    let shop_product = repositories
        .find_shop_product(shop_product_id)
        .await?
        .ok_or_else(|| {
            AppError::validation(format!("shop product {shop_product_id} does not exist"))
        })?;

    let app = build_application_context(repositories, &settings);
    let context = CacheContext::for_groups(
        shop_product.shop_id,
        args.groups.into_iter().map(GroupId::new),
    );
    let price = app.query.catalog_price_for(shop_product_id, &context).await?;

    let rendered = serde_json::to_string_pretty(&price)
        .map_err(|err| AppError::unexpected(format!("failed to encode price: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "catalog_index::migrate", "Migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> ApplicationContext {
    let reader: Arc<dyn CatalogReadRepo> = repositories.clone();
    let writer: Arc<dyn CatalogWriteRepo> = repositories.clone();

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = match settings.cache.backend {
        CacheBackendKind::Memory => ContextCache::in_memory(cache_config),
        CacheBackendKind::Postgres => ContextCache::new(
            cache_config,
            Arc::new(PostgresCacheBackend::new(repositories.as_ref().clone())),
        ),
    };

    let indexer = CatalogIndexer::new(
        reader.clone(),
        writer,
        settings.indexer.reindex_concurrency.get(),
    );
    let query = CatalogQuery::new(reader.clone()).with_cache(cache.clone());
    let router = InvalidationRouter::new(reader, indexer.clone(), cache.clone());

    ApplicationContext {
        indexer,
        cache,
        query,
        router,
    }
}
