//! Infrastructure layer: product stores, schema bootstrap, config.

pub mod config;
pub mod repository;

pub use config::{CatalogConfig, ConfigError, StoreConfig};
pub use repository::{InMemoryProductRepository, PostgresProductRepository};
