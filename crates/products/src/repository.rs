//! Persistence port for products.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use catalog_core::ProductId;

use crate::product::Product;

/// Repository operation error.
///
/// These are **infrastructure errors**, as opposed to business-rule
/// violations. The catalog service never handles or retries them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A storage constraint rejected the record (NOT NULL, uniqueness,
    /// length, check constraints).
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Any other storage failure (connectivity, decoding, closed pool).
    #[error("{0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Persistent product store keyed by a store-assigned identifier.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Store `product` and return its canonical stored form.
    ///
    /// Without an `id` the record is inserted under a new identifier. With an
    /// `id` that is already stored the record is replaced as a whole. An `id`
    /// the store does not know is not honored: the record is inserted under a
    /// fresh identifier. The write is all-or-nothing.
    async fn insert_or_replace(&self, product: Product) -> Result<Product, RepositoryError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Every stored product, in store-defined order.
    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError>;
}

#[async_trait]
impl<S> ProductRepository for Arc<S>
where
    S: ProductRepository + ?Sized,
{
    async fn insert_or_replace(&self, product: Product) -> Result<Product, RepositoryError> {
        (**self).insert_or_replace(product).await
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
        (**self).find_all().await
    }
}
