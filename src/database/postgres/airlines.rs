use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::conflict_on;
use crate::catalog::Airline;
use crate::database::CatalogRepository;
use crate::error::{Result, ServerError};

const UNIQUE: &[(&str, &str)] = &[("airlines_name_key", "name")];

#[derive(Debug, FromRow)]
struct AirlineRecord {
    id: Uuid,
    name: String,
    image: String,
}

impl From<AirlineRecord> for Airline {
    fn from(record: AirlineRecord) -> Self {
        Airline {
            id: record.id,
            name: record.name,
            image: record.image,
        }
    }
}

/// PostgreSQL airline repository.
pub struct PgAirlines {
    pool: PgPool,
}

impl PgAirlines {
    /// Create a new [`PgAirlines`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository<Airline> for PgAirlines {
    async fn list(&self) -> Result<Vec<Airline>> {
        let records = sqlx::query_as::<_, AirlineRecord>(
            "SELECT id, name, image FROM airlines ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Airline::from).collect())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Airline>> {
        let record = sqlx::query_as::<_, AirlineRecord>(
            "SELECT id, name, image FROM airlines WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Airline::from))
    }

    async fn insert(&self, airline: &Airline) -> Result<()> {
        sqlx::query("INSERT INTO airlines (id, name, image) VALUES ($1, $2, $3)")
            .bind(airline.id)
            .bind(&airline.name)
            .bind(&airline.image)
            .execute(&self.pool)
            .await
            .map_err(conflict_on("airline", UNIQUE))?;

        Ok(())
    }

    async fn update(&self, airline: &Airline) -> Result<()> {
        let result = sqlx::query(
            "UPDATE airlines SET name = $2, image = $3 WHERE id = $1",
        )
        .bind(airline.id)
        .bind(&airline.name)
        .bind(&airline.image)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("airline", UNIQUE))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::not_found("airline"));
        }

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<Option<Airline>> {
        let record = sqlx::query_as::<_, AirlineRecord>(
            "DELETE FROM airlines WHERE id = $1 RETURNING id, name, image",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Airline::from))
    }
}
