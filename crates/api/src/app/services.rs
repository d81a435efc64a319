use std::sync::Arc;

use anyhow::Context;

use catalog_infra::{
    CatalogConfig, InMemoryProductRepository, PostgresProductRepository, StoreConfig,
};
use catalog_products::{CatalogRules, CatalogService, ProductRepository, ProductValidator};

pub type SharedRepository = Arc<dyn ProductRepository>;
pub type SharedValidator = Arc<dyn ProductValidator>;
pub type Catalog = CatalogService<SharedRepository, SharedValidator>;

/// Everything the handlers need, cheap to clone into each request.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<Catalog>,
    store: &'static str,
}

impl AppServices {
    pub fn new(repository: SharedRepository, validator: SharedValidator, store: &'static str) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(repository, validator)),
            store,
        }
    }

    /// In-memory wiring (dev/test) with the default catalog rules.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryProductRepository::new()),
            Arc::new(CatalogRules),
            "memory",
        )
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Name of the backing store, for logs and the health endpoint.
    pub fn store(&self) -> &'static str {
        self.store
    }
}

pub async fn build_services(config: &CatalogConfig) -> anyhow::Result<AppServices> {
    match &config.store {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory product store");
            Ok(AppServices::in_memory())
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let repository = PostgresProductRepository::connect(database_url, *max_connections)
                .await
                .context("failed to connect to Postgres")?;
            tracing::info!(max_connections, "using Postgres product store");
            Ok(AppServices::new(
                Arc::new(repository),
                Arc::new(CatalogRules),
                "postgres",
            ))
        }
    }
}
