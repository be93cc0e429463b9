//! Product snapshot catalog.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use datalayer_core::{Error, Product, ProductCatalog, Result};

/// PostgreSQL implementation of ProductCatalog storing products as JSONB.
#[derive(Clone)]
pub struct PgProductCatalog {
    pool: Pool<Postgres>,
}

impl PgProductCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn get(&self, id: u64) -> Result<Option<Product>> {
        let id = i64::try_from(id).map_err(|_| Error::InvalidInput(format!("product id {} out of range", id)))?;
        let row = sqlx::query("SELECT data FROM product_snapshot WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.get("data");
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, product: &Product) -> Result<()> {
        let id = i64::try_from(product.id)
            .map_err(|_| Error::InvalidInput(format!("product id {} out of range", product.id)))?;
        let data = serde_json::to_value(product)?;
        sqlx::query(
            "INSERT INTO product_snapshot (id, data, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
        )
        .bind(id)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
