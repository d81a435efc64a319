//! `ProductRepository` implementations.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryProductRepository;
pub use postgres::{PostgresProductRepository, ensure_schema};
