use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use catalog_core::ProductId;

/// Currency applied when the caller does not provide one.
pub const DEFAULT_CURRENCY: &str = "CLP";

/// Maximum title length accepted by the catalog (and the `products.title` column).
pub const TITLE_MAX_LEN: usize = 255;

/// Decimal places kept by the `products.price` column.
pub const PRICE_MAX_SCALE: u32 = 2;

/// Exclusive upper bound of `NUMERIC(19, 2)`: 17 integer digits.
pub const PRICE_LIMIT: Decimal = Decimal::from_parts(0x5D8A_0000, 0x0163_4578, 0, false, 0);

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// A catalog product.
///
/// This is a plain value: the API layer deserializes it, the validator checks
/// it, and the repository returns its canonical stored form. Seller fields are
/// denormalized and carry no relational integrity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Absent until the store assigns one on first insert.
    #[serde(default)]
    pub id: Option<ProductId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    pub price: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub stock_available: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub specifications: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,

    #[serde(default)]
    pub seller_id: Option<i64>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub seller_rating: Option<f32>,

    #[serde(default)]
    pub units_sold: i32,
    #[serde(default = "Utc::now")]
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub free_shipping: bool,
    #[serde(default)]
    pub shipping_method: Option<String>,
    #[serde(default)]
    pub average_rating: f32,
    #[serde(default)]
    pub total_reviews: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            id: None,
            title: None,
            price: None,
            currency: default_currency(),
            stock_available: None,
            description: None,
            specifications: Vec::new(),
            image_urls: Vec::new(),
            seller_id: None,
            seller_name: None,
            seller_rating: None,
            units_sold: 0,
            published_at: Utc::now(),
            free_shipping: false,
            shipping_method: None,
            average_rating: 0.0,
            total_reviews: 0,
            updated_at: None,
        }
    }
}

impl Product {
    /// New, not-yet-stored product with the three fields every record needs.
    pub fn new(title: impl Into<String>, price: Decimal, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            price: Some(price),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Same record, carrying the given identifier.
    pub fn with_id(mut self, id: ProductId) -> Self {
        self.id = Some(id);
        self
    }
}
