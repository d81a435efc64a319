use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::SubsecRound;
use rust_decimal::RoundingStrategy;

use catalog_core::ProductId;
use catalog_products::{
    PRICE_LIMIT, PRICE_MAX_SCALE, Product, ProductRepository, RepositoryError, TITLE_MAX_LEN,
};

/// Length of the `VARCHAR(255)` text columns other than `title`.
const TEXT_COLUMN_MAX_LEN: usize = 255;

#[derive(Debug)]
struct Inner {
    rows: BTreeMap<ProductId, Product>,
    next_id: i64,
}

/// In-memory product store for tests/dev.
///
/// Stores records in the same form the `products` table would: prices
/// rounded to cents, timestamps cut to microseconds. Records the table would
/// refuse (NOT NULL, `VARCHAR` lengths, `NUMERIC(19, 2)` overflow) are
/// refused here too, as `RepositoryError::Integrity`. Listing returns
/// products in ascending id order.
#[derive(Debug)]
pub struct InMemoryProductRepository {
    inner: RwLock<Inner>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryProductRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::backend("in-memory product store lock poisoned")
}

fn too_long(value: Option<&str>, max: usize) -> bool {
    value.is_some_and(|v| v.chars().count() > max)
}

/// Apply the `products` column rules: reject what the table refuses, round
/// what it rounds.
fn to_column_form(mut product: Product) -> Result<Product, RepositoryError> {
    if product.title.is_none() {
        return Err(RepositoryError::integrity("null value in column \"title\""));
    }
    if too_long(product.title.as_deref(), TITLE_MAX_LEN) {
        return Err(RepositoryError::integrity("value too long for column \"title\""));
    }
    if product.description.is_none() {
        return Err(RepositoryError::integrity("null value in column \"description\""));
    }
    if product.currency.chars().count() > 3 {
        return Err(RepositoryError::integrity("value too long for column \"currency\""));
    }
    if too_long(product.seller_name.as_deref(), TEXT_COLUMN_MAX_LEN) {
        return Err(RepositoryError::integrity("value too long for column \"seller_name\""));
    }
    if too_long(product.shipping_method.as_deref(), TEXT_COLUMN_MAX_LEN) {
        return Err(RepositoryError::integrity(
            "value too long for column \"shipping_method\"",
        ));
    }

    let price = product
        .price
        .ok_or_else(|| RepositoryError::integrity("null value in column \"price\""))?
        .round_dp_with_strategy(PRICE_MAX_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if price.abs() >= PRICE_LIMIT {
        return Err(RepositoryError::integrity("numeric field overflow in column \"price\""));
    }
    product.price = Some(price);

    product.published_at = product.published_at.trunc_subsecs(6);
    product.updated_at = product.updated_at.map(|t| t.trunc_subsecs(6));
    Ok(product)
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn insert_or_replace(&self, product: Product) -> Result<Product, RepositoryError> {
        let product = to_column_form(product)?;

        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let id = match product.id {
            Some(id) if inner.rows.contains_key(&id) => id,
            _ => {
                let id = ProductId::new(inner.next_id);
                inner.next_id += 1;
                id
            }
        };

        let stored = product.with_id(id);
        inner.rows.insert(id, stored.clone());
        tracing::debug!(product_id = %id, "stored product in memory");
        Ok(stored)
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.rows.values().cloned().collect())
    }
}
