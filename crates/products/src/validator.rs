//! Business rules a product must satisfy before it may reach storage.
//!
//! Rules are checked in a fixed order and the first violation is reported on
//! its own; violations are never accumulated. The price rules always run
//! first.

use rust_decimal::Decimal;

use catalog_core::{ValidationError, ValidationResult};

use crate::product::{PRICE_LIMIT, PRICE_MAX_SCALE, Product, TITLE_MAX_LEN};

pub const PRICE_REQUIRED: &str = "El precio del producto es obligatorio y no puede ser nulo.";
pub const PRICE_NOT_POSITIVE: &str = "El precio del producto debe ser mayor que cero.";
pub const PRICE_TOO_PRECISE: &str = "El precio del producto admite como máximo dos decimales.";
pub const PRICE_TOO_LARGE: &str = "El precio del producto excede el máximo permitido.";
pub const TITLE_REQUIRED: &str = "El título del producto es obligatorio.";
pub const TITLE_TOO_LONG: &str = "El título del producto no puede superar los 255 caracteres.";
pub const DESCRIPTION_REQUIRED: &str = "La descripción del producto es obligatoria.";
pub const CURRENCY_INVALID: &str = "La moneda debe ser un código de 3 letras.";
pub const STOCK_NEGATIVE: &str = "El stock disponible no puede ser negativo.";
pub const UNITS_SOLD_NEGATIVE: &str = "La cantidad vendida no puede ser negativa.";
pub const TOTAL_REVIEWS_NEGATIVE: &str = "El total de opiniones no puede ser negativo.";

/// Pre-persistence check on a candidate product.
///
/// Implementations are pure: no IO, no mutation, same answer for the same
/// input.
pub trait ProductValidator: Send + Sync {
    fn check(&self, product: &Product) -> ValidationResult;
}

impl<V> ProductValidator for std::sync::Arc<V>
where
    V: ProductValidator + ?Sized,
{
    fn check(&self, product: &Product) -> ValidationResult {
        (**self).check(product)
    }
}

/// The catalog's rule set.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogRules;

impl ProductValidator for CatalogRules {
    fn check(&self, product: &Product) -> ValidationResult {
        let price = product
            .price
            .ok_or_else(|| ValidationError::new(PRICE_REQUIRED))?;
        if price <= Decimal::ZERO {
            return Err(ValidationError::new(PRICE_NOT_POSITIVE));
        }
        // Anything finer than a cent would be rounded by the store, possibly to zero.
        if price.round_dp(PRICE_MAX_SCALE) != price {
            return Err(ValidationError::new(PRICE_TOO_PRECISE));
        }
        if price >= PRICE_LIMIT {
            return Err(ValidationError::new(PRICE_TOO_LARGE));
        }

        let title = non_blank(product.title.as_deref())
            .ok_or_else(|| ValidationError::new(TITLE_REQUIRED))?;
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(ValidationError::new(TITLE_TOO_LONG));
        }

        if non_blank(product.description.as_deref()).is_none() {
            return Err(ValidationError::new(DESCRIPTION_REQUIRED));
        }

        let currency = &product.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::new(CURRENCY_INVALID));
        }

        if product.stock_available.is_some_and(|stock| stock < 0) {
            return Err(ValidationError::new(STOCK_NEGATIVE));
        }
        if product.units_sold < 0 {
            return Err(ValidationError::new(UNITS_SOLD_NEGATIVE));
        }
        if product.total_reviews < 0 {
            return Err(ValidationError::new(TOTAL_REVIEWS_NEGATIVE));
        }

        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
