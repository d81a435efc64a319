//! Products domain module (catalog).
//!
//! This crate contains the product data model, the business rules a product
//! must satisfy before it is stored, the repository port, and the catalog
//! service that sequences the two. It performs no IO of its own.

pub mod product;
pub mod repository;
pub mod service;
pub mod validator;

pub use product::{DEFAULT_CURRENCY, PRICE_LIMIT, PRICE_MAX_SCALE, Product, TITLE_MAX_LEN};
pub use repository::{ProductRepository, RepositoryError};
pub use service::{CatalogError, CatalogService};
pub use validator::{CatalogRules, ProductValidator};
