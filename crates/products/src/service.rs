//! Catalog service: validation, then persistence.
//!
//! The service owns the order in which business rules and storage are
//! applied. Reads are passed through unmodified. It holds no mutable state of
//! its own, so one instance is shared across requests behind an `Arc`.

use thiserror::Error;
use tracing::instrument;

use catalog_core::{ProductId, ValidationError};

use crate::product::Product;
use crate::repository::{ProductRepository, RepositoryError};
use crate::validator::{CatalogRules, ProductValidator};

/// Failure of a catalog operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The product broke a business rule; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The repository failed; surfaced unchanged.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct CatalogService<R, V = CatalogRules> {
    repository: R,
    validator: V,
}

impl<R> CatalogService<R, CatalogRules>
where
    R: ProductRepository,
{
    /// Service enforcing the default catalog rules.
    pub fn with_default_rules(repository: R) -> Self {
        Self::new(repository, CatalogRules)
    }
}

impl<R, V> CatalogService<R, V>
where
    R: ProductRepository,
    V: ProductValidator,
{
    pub fn new(repository: R, validator: V) -> Self {
        Self {
            repository,
            validator,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Validate `product` and, if it passes, hand it to the repository's
    /// upsert. Returns exactly what the repository returns.
    #[instrument(skip(self, product), fields(product_id = ?product.id), err)]
    pub async fn save(&self, product: Product) -> Result<Product, CatalogError> {
        tracing::info!("saving product");

        if let Err(e) = self.validator.check(&product) {
            tracing::warn!(reason = %e, "product rejected by validation");
            return Err(e.into());
        }
        tracing::debug!("validation passed");

        let stored = self.repository.insert_or_replace(product).await?;
        tracing::info!(stored_id = ?stored.id, "product saved");
        Ok(stored)
    }

    /// Point lookup. `None` when no record matches; that is not an error.
    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        let found = self.repository.find_by_id(id).await?;
        match &found {
            Some(p) => tracing::debug!(title = ?p.title, "product found"),
            None => tracing::warn!("no product with this id"),
        }
        Ok(found)
    }

    /// Every stored product, in store-defined order.
    #[instrument(skip(self), err)]
    pub async fn find_all(&self) -> Result<Vec<Product>, CatalogError> {
        let products = self.repository.find_all().await?;
        tracing::debug!(count = products.len(), "listed products");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{PRICE_NOT_POSITIVE, PRICE_TOO_PRECISE};
    use async_trait::async_trait;
    use core::str::FromStr;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Repository fake that records calls and can be primed to fail.
    #[derive(Debug, Default)]
    struct RecordingRepository {
        rows: Mutex<BTreeMap<ProductId, Product>>,
        upserts: Mutex<Vec<Product>>,
        fail_with: Option<RepositoryError>,
    }

    impl RecordingRepository {
        fn failing(err: RepositoryError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::default()
            }
        }

        fn upsert_calls(&self) -> usize {
            self.upserts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ProductRepository for RecordingRepository {
        async fn insert_or_replace(&self, product: Product) -> Result<Product, RepositoryError> {
            self.upserts.lock().unwrap().push(product.clone());
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let mut rows = self.rows.lock().unwrap();
            let id = match product.id {
                Some(id) if rows.contains_key(&id) => id,
                _ => ProductId::new(rows.len() as i64 + 1),
            };
            let stored = product.with_id(id);
            rows.insert(id, stored.clone());
            Ok(stored)
        }

        async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    fn laptop() -> Product {
        Product::new(
            "Laptop Gaming",
            Decimal::from_str("1500.00").unwrap(),
            "Laptop con RTX 4060",
        )
    }

    fn service() -> CatalogService<RecordingRepository> {
        CatalogService::with_default_rules(RecordingRepository::default())
    }

    #[tokio::test]
    async fn save_returns_what_the_repository_stored() {
        let svc = service();
        let stored = svc.save(laptop()).await.unwrap();

        assert_eq!(stored.id, Some(ProductId::new(1)));
        assert_eq!(stored.title.as_deref(), Some("Laptop Gaming"));
        assert_eq!(svc.repository().upsert_calls(), 1);
        assert_eq!(svc.repository().upserts.lock().unwrap()[0].id, None);
    }

    #[tokio::test]
    async fn zero_price_never_reaches_the_repository() {
        let svc = service();
        let product = Product {
            price: Some(Decimal::ZERO),
            ..Product::default()
        };

        let err = svc.save(product).await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::Validation(ValidationError::new(PRICE_NOT_POSITIVE))
        );
        assert_eq!(svc.repository().upsert_calls(), 0);
    }

    #[tokio::test]
    async fn sub_cent_price_never_reaches_the_repository() {
        let svc = service();
        let product = Product {
            price: Some(Decimal::new(4, 3)),
            ..laptop()
        };

        let err = svc.save(product).await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::Validation(ValidationError::new(PRICE_TOO_PRECISE))
        );
        assert_eq!(svc.repository().upsert_calls(), 0);
    }

    #[tokio::test]
    async fn repository_errors_propagate_unchanged() {
        let err = RepositoryError::integrity("null value in column \"title\"");
        let svc = CatalogService::with_default_rules(RecordingRepository::failing(err.clone()));

        assert_eq!(svc.save(laptop()).await.unwrap_err(), CatalogError::Repository(err.clone()));
        assert_eq!(svc.repository().upsert_calls(), 1);
        assert_eq!(
            svc.find_by_id(ProductId::new(1)).await.unwrap_err(),
            CatalogError::Repository(err.clone())
        );
        assert_eq!(svc.find_all().await.unwrap_err(), CatalogError::Repository(err));
    }

    #[tokio::test]
    async fn save_with_known_id_replaces_the_record() {
        let svc = service();
        let stored = svc.save(laptop()).await.unwrap();

        let mut changed = stored.clone();
        changed.title = Some("Laptop Gaming Pro".to_string());
        let replaced = svc.save(changed).await.unwrap();

        assert_eq!(replaced.id, stored.id);
        assert_eq!(svc.find_all().await.unwrap().len(), 1);
        assert_eq!(
            svc.find_by_id(ProductId::new(1)).await.unwrap().unwrap().title.as_deref(),
            Some("Laptop Gaming Pro")
        );
    }

    #[tokio::test]
    async fn find_by_id_of_unknown_record_is_none() {
        let svc = service();
        assert_eq!(svc.find_by_id(ProductId::new(99)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_all_on_empty_store_is_empty() {
        let svc = service();
        assert!(svc.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let svc = service();
        svc.save(laptop()).await.unwrap();
        svc.save(laptop()).await.unwrap();

        let first = svc.find_all().await.unwrap();
        let second = svc.find_all().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let a = svc.find_by_id(ProductId::new(2)).await.unwrap();
        let b = svc.find_by_id(ProductId::new(2)).await.unwrap();
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[tokio::test]
    async fn custom_validator_is_used_instead_of_default_rules() {
        struct RejectAll;
        impl ProductValidator for RejectAll {
            fn check(&self, _product: &Product) -> catalog_core::ValidationResult {
                Err(ValidationError::new("cerrado"))
            }
        }

        let svc = CatalogService::new(RecordingRepository::default(), RejectAll);
        let err = svc.save(laptop()).await.unwrap_err();
        assert_eq!(err.to_string(), "cerrado");
        assert_eq!(svc.repository().upsert_calls(), 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(fut)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 200,
                ..ProptestConfig::default()
            })]

            /// Property: absent or non-positive price never invokes the repository.
            #[test]
            fn invalid_price_never_persists(cents in proptest::option::of(-1_000_000i64..=0)) {
                let svc = service();
                let product = Product {
                    price: cents.map(|c| Decimal::new(c, 2)),
                    ..laptop()
                };
                let result = block_on(svc.save(product));
                prop_assert!(matches!(result, Err(CatalogError::Validation(_))));
                prop_assert_eq!(svc.repository().upsert_calls(), 0);
            }

            /// Property: valid products are stored exactly once and returned as stored.
            #[test]
            fn valid_product_persists_exactly_once(cents in 1i64..1_000_000_000) {
                let svc = service();
                let product = Product {
                    price: Some(Decimal::new(cents, 2)),
                    ..laptop()
                };
                let stored = block_on(svc.save(product)).unwrap();
                prop_assert_eq!(svc.repository().upsert_calls(), 1);
                let id = stored.id.unwrap();
                prop_assert_eq!(block_on(svc.find_by_id(id)).unwrap(), Some(stored));
            }
        }
    }
}
