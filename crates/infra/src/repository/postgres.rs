//! Postgres-backed product repository.
//!
//! A product is stored as one `products` row plus ordered rows in
//! `product_specifications` and `product_image_urls`. Every write touches all
//! three tables inside one transaction, so a failed save leaves nothing
//! behind, and returns the record as read back inside that transaction.
//! Reads run in a `REPEATABLE READ, READ ONLY` transaction so the row and its
//! collections always come from the same committed save.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database | `23xxx` (integrity constraint) | `Integrity` | NOT NULL, unique, FK or check violation |
//! | Database | `22xxx` (data exception) | `Integrity` | Value too long, numeric overflow |
//! | Database | Any other | `Backend` | Other database errors |
//! | PoolClosed / Io / Tls / ... | N/A | `Backend` | Connectivity failures |
//! | ColumnDecode / Decode | N/A | `Backend` | Row could not be read back |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};

use catalog_core::ProductId;
use catalog_products::{Product, ProductRepository, RepositoryError};

const SCHEMA: &str = include_str!("../../migrations/0001_create_products.sql");

/// Create the catalog tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

/// Postgres-backed product repository.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the repository can
/// be shared across request handlers.
#[derive(Debug, Clone)]
pub struct PostgresProductRepository {
    pool: Arc<PgPool>,
}

impl PostgresProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url` and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn update_row(
        tx: &mut Transaction<'_, Postgres>,
        id: ProductId,
        product: &Product,
    ) -> Result<Option<i64>, RepositoryError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE products SET
                title = $2,
                price = $3,
                currency = $4,
                stock_available = $5,
                description = $6,
                seller_id = $7,
                seller_name = $8,
                seller_rating = $9,
                units_sold = $10,
                published_at = $11,
                free_shipping = $12,
                shipping_method = $13,
                average_rating = $14,
                total_reviews = $15,
                updated_at = $16
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id.get())
        .bind(product.title.as_deref())
        .bind(product.price)
        .bind(&product.currency)
        .bind(product.stock_available)
        .bind(product.description.as_deref())
        .bind(product.seller_id)
        .bind(product.seller_name.as_deref())
        .bind(product.seller_rating)
        .bind(product.units_sold)
        .bind(product.published_at)
        .bind(product.free_shipping)
        .bind(product.shipping_method.as_deref())
        .bind(product.average_rating)
        .bind(product.total_reviews)
        .bind(product.updated_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        product: &Product,
    ) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO products (
                title,
                price,
                currency,
                stock_available,
                description,
                seller_id,
                seller_name,
                seller_rating,
                units_sold,
                published_at,
                free_shipping,
                shipping_method,
                average_rating,
                total_reviews,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(product.title.as_deref())
        .bind(product.price)
        .bind(&product.currency)
        .bind(product.stock_available)
        .bind(product.description.as_deref())
        .bind(product.seller_id)
        .bind(product.seller_name.as_deref())
        .bind(product.seller_rating)
        .bind(product.units_sold)
        .bind(product.published_at)
        .bind(product.free_shipping)
        .bind(product.shipping_method.as_deref())
        .bind(product.average_rating)
        .bind(product.total_reviews)
        .bind(product.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))
    }

    /// Replace the ordered collection rows of one product.
    async fn replace_collections(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        product: &Product,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM product_specifications WHERE product_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("clear_specifications", e))?;
        sqlx::query("DELETE FROM product_image_urls WHERE product_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("clear_image_urls", e))?;

        if !product.specifications.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO product_specifications (product_id, position, specification)
                SELECT $1, (t.ord - 1)::int, t.item
                FROM UNNEST($2::text[]) WITH ORDINALITY AS t(item, ord)
                "#,
            )
            .bind(id)
            .bind(product.specifications.as_slice())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_specifications", e))?;
        }

        if !product.image_urls.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO product_image_urls (product_id, position, image_url)
                SELECT $1, (t.ord - 1)::int, t.item
                FROM UNNEST($2::text[]) WITH ORDINALITY AS t(item, ord)
                "#,
            )
            .bind(id)
            .bind(product.image_urls.as_slice())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_image_urls", e))?;
        }

        Ok(())
    }

    /// Transaction with a single snapshot for multi-statement reads.
    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(tx)
    }
}

const SELECT_PRODUCT_COLUMNS: &str = r#"
    SELECT
        id,
        title,
        price,
        currency,
        stock_available,
        description,
        seller_id,
        seller_name,
        seller_rating,
        units_sold,
        published_at,
        free_shipping,
        shipping_method,
        average_rating,
        total_reviews,
        updated_at
    FROM products
"#;

const SELECT_SPECIFICATIONS: &str =
    "SELECT specification FROM product_specifications WHERE product_id = $1 ORDER BY position";
const SELECT_IMAGE_URLS: &str =
    "SELECT image_url FROM product_image_urls WHERE product_id = $1 ORDER BY position";
const SELECT_ALL_SPECIFICATIONS: &str =
    "SELECT product_id, specification AS item FROM product_specifications ORDER BY product_id, position";
const SELECT_ALL_IMAGE_URLS: &str =
    "SELECT product_id, image_url AS item FROM product_image_urls ORDER BY product_id, position";

async fn fetch_product(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<Product>, RepositoryError> {
    let sql = format!("{SELECT_PRODUCT_COLUMNS} WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut product = ProductRow::from_pg_row(&row)?.into_product();
    product.specifications = load_collection(conn, SELECT_SPECIFICATIONS, id).await?;
    product.image_urls = load_collection(conn, SELECT_IMAGE_URLS, id).await?;
    Ok(Some(product))
}

async fn fetch_all_products(conn: &mut PgConnection) -> Result<Vec<Product>, RepositoryError> {
    let sql = format!("{SELECT_PRODUCT_COLUMNS} ORDER BY id ASC");
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_all", e))?;

    let mut specifications = load_all_collections(conn, SELECT_ALL_SPECIFICATIONS).await?;
    let mut image_urls = load_all_collections(conn, SELECT_ALL_IMAGE_URLS).await?;

    let mut products = Vec::with_capacity(rows.len());
    for row in &rows {
        let parsed = ProductRow::from_pg_row(row)?;
        let id = parsed.id;
        let mut product = parsed.into_product();
        product.specifications = specifications.remove(&id).unwrap_or_default();
        product.image_urls = image_urls.remove(&id).unwrap_or_default();
        products.push(product);
    }
    Ok(products)
}

async fn load_collection(
    conn: &mut PgConnection,
    sql: &str,
    id: i64,
) -> Result<Vec<String>, RepositoryError> {
    sqlx::query_scalar::<_, String>(sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_collection", e))
}

async fn load_all_collections(
    conn: &mut PgConnection,
    sql: &str,
) -> Result<HashMap<i64, Vec<String>>, RepositoryError> {
    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_collections", e))?;

    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        let product_id: i64 = row
            .try_get("product_id")
            .map_err(|e| map_sqlx_error("decode_collection", e))?;
        let item: String = row
            .try_get("item")
            .map_err(|e| map_sqlx_error("decode_collection", e))?;
        grouped.entry(product_id).or_default().push(item);
    }
    Ok(grouped)
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    #[instrument(skip(self, product), fields(product_id = ?product.id), err)]
    async fn insert_or_replace(&self, product: Product) -> Result<Product, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let replaced = match product.id {
            Some(id) => Self::update_row(&mut tx, id, &product).await?,
            None => None,
        };
        let id = match replaced {
            Some(id) => id,
            None => Self::insert_row(&mut tx, &product).await?,
        };

        Self::replace_collections(&mut tx, id, &product).await?;

        // Columns round price and timestamps; hand back what was kept.
        let stored = fetch_product(&mut tx, id).await?.ok_or_else(|| {
            RepositoryError::backend(format!("product {id} missing right after it was written"))
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(stored)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut tx = self.begin_snapshot().await?;
        let product = fetch_product(&mut tx, id.get()).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_count = tracing::field::Empty), err)]
    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let mut tx = self.begin_snapshot().await?;
        let products = fetch_all_products(&mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("product_count", products.len());
        Ok(products)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let class = db_err.code().map(|c| c.chars().take(2).collect::<String>());
            match class.as_deref() {
                // Integrity constraint violation / data exception
                Some("23") | Some("22") => RepositoryError::Integrity(msg),
                _ => RepositoryError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Backend(format!("connection pool closed in {}", operation))
        }
        other => RepositoryError::Backend(format!("{} failed: {}", operation, other)),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: i64,
    title: String,
    price: Decimal,
    currency: String,
    stock_available: Option<i32>,
    description: String,
    seller_id: Option<i64>,
    seller_name: Option<String>,
    seller_rating: Option<f32>,
    units_sold: i32,
    published_at: DateTime<Utc>,
    free_shipping: bool,
    shipping_method: Option<String>,
    average_rating: f32,
    total_reviews: i32,
    updated_at: Option<DateTime<Utc>>,
}

impl ProductRow {
    fn from_pg_row(row: &PgRow) -> Result<Self, RepositoryError> {
        Self::decode(row).map_err(|e| map_sqlx_error("decode_product", e))
    }

    fn decode(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            stock_available: row.try_get("stock_available")?,
            description: row.try_get("description")?,
            seller_id: row.try_get("seller_id")?,
            seller_name: row.try_get("seller_name")?,
            seller_rating: row.try_get("seller_rating")?,
            units_sold: row.try_get("units_sold")?,
            published_at: row.try_get("published_at")?,
            free_shipping: row.try_get("free_shipping")?,
            shipping_method: row.try_get("shipping_method")?,
            average_rating: row.try_get("average_rating")?,
            total_reviews: row.try_get("total_reviews")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_product(self) -> Product {
        Product {
            id: Some(ProductId::new(self.id)),
            title: Some(self.title),
            price: Some(self.price),
            currency: self.currency,
            stock_available: self.stock_available,
            description: Some(self.description),
            specifications: Vec::new(),
            image_urls: Vec::new(),
            seller_id: self.seller_id,
            seller_name: self.seller_name,
            seller_rating: self.seller_rating,
            units_sold: self.units_sold,
            published_at: self.published_at,
            free_shipping: self.free_shipping,
            shipping_method: self.shipping_method,
            average_rating: self.average_rating,
            total_reviews: self.total_reviews,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Runs against a live database only when `CATALOG_TEST_DATABASE_URL` is set.

    use super::*;
    use chrono::TimeZone;

    async fn repo() -> Option<PostgresProductRepository> {
        let url = std::env::var("CATALOG_TEST_DATABASE_URL").ok()?;
        let repo = PostgresProductRepository::connect(&url, 2).await.ok()?;
        Some(repo)
    }

    #[tokio::test]
    async fn round_trips_collections_in_order() {
        let Some(repo) = repo().await else {
            return;
        };

        let mut product = Product::new("Laptop Gaming", Decimal::new(150000, 2), "RTX 4060");
        product.specifications = vec!["16GB".to_string(), "1TB SSD".to_string()];
        product.image_urls = vec!["https://img/a.png".to_string()];

        let stored = repo.insert_or_replace(product).await.unwrap();
        let id = stored.id.unwrap();
        let loaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.specifications, vec!["16GB", "1TB SSD"]);
        assert_eq!(loaded.image_urls, vec!["https://img/a.png"]);
        assert_eq!(loaded.price, Some(Decimal::new(150000, 2)));

        let mut changed = loaded.clone();
        changed.specifications = vec!["32GB".to_string()];
        repo.insert_or_replace(changed).await.unwrap();
        let reloaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded.specifications, vec!["32GB"]);
    }

    #[tokio::test]
    async fn save_returns_what_a_later_read_sees() {
        let Some(repo) = repo().await else {
            return;
        };

        let product = Product {
            published_at: Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            ..Product::new("Chicle", Decimal::new(1005, 3), "menta")
        };
        let stored = repo.insert_or_replace(product).await.unwrap();
        let loaded = repo.find_by_id(stored.id.unwrap()).await.unwrap().unwrap();

        assert_eq!(stored, loaded);
        assert_eq!(stored.price, Some(Decimal::new(101, 2)));
        assert_eq!(stored.published_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn price_overflow_maps_to_integrity() {
        let Some(repo) = repo().await else {
            return;
        };

        let product = Product::new("Yate", catalog_products::PRICE_LIMIT, "grande");
        let err = repo.insert_or_replace(product).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Integrity(_)), "{err:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reads_never_mix_two_saves() {
        let Some(repo) = repo().await else {
            return;
        };

        let mut seed = Product::new("v0", Decimal::ONE, "versiones");
        seed.specifications = vec!["v0".to_string()];
        let seed = repo.insert_or_replace(seed).await.unwrap();
        let id = seed.id.unwrap();

        let writer = {
            let repo = repo.clone();
            tokio::spawn(async move {
                for i in 1..=200 {
                    let tag = format!("v{i}");
                    let next = Product {
                        title: Some(tag.clone()),
                        specifications: vec![tag],
                        ..seed.clone()
                    };
                    repo.insert_or_replace(next).await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let one = repo.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(one.title.as_ref(), one.specifications.first());

            let all = repo.find_all().await.unwrap();
            let listed = all.iter().find(|p| p.id == Some(id)).unwrap();
            assert_eq!(listed.title.as_ref(), listed.specifications.first());
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn null_title_maps_to_integrity() {
        let Some(repo) = repo().await else {
            return;
        };

        let product = Product {
            title: None,
            ..Product::new("x", Decimal::ONE, "y")
        };
        let err = repo.insert_or_replace(product).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Integrity(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_id_reads_as_none() {
        let Some(repo) = repo().await else {
            return;
        };
        assert_eq!(repo.find_by_id(ProductId::new(i64::MAX)).await.unwrap(), None);
    }
}
