use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::conflict_on;
use crate::catalog::Destination;
use crate::database::CatalogRepository;
use crate::error::{Result, ServerError};

const UNIQUE: &[(&str, &str)] = &[
    ("destinations_name_key", "name"),
    ("destinations_iata_code_key", "IATA code"),
];

#[derive(Debug, FromRow)]
struct DestinationRecord {
    id: Uuid,
    name: String,
    iata_code: String,
    airport: String,
    image: Option<String>,
}

impl From<DestinationRecord> for Destination {
    fn from(record: DestinationRecord) -> Self {
        Destination {
            id: record.id,
            name: record.name,
            iata_code: record.iata_code,
            airport: record.airport,
            image: record.image,
        }
    }
}

/// PostgreSQL destination repository.
pub struct PgDestinations {
    pool: PgPool,
}

impl PgDestinations {
    /// Create a new [`PgDestinations`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository<Destination> for PgDestinations {
    async fn list(&self) -> Result<Vec<Destination>> {
        let records = sqlx::query_as::<_, DestinationRecord>(
            r#"
            SELECT id, name, iata_code, airport, image
            FROM destinations
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Destination::from).collect())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Destination>> {
        let record = sqlx::query_as::<_, DestinationRecord>(
            r#"
            SELECT id, name, iata_code, airport, image
            FROM destinations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Destination::from))
    }

    async fn insert(&self, destination: &Destination) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO destinations (id, name, iata_code, airport, image)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(destination.id)
        .bind(&destination.name)
        .bind(&destination.iata_code)
        .bind(&destination.airport)
        .bind(&destination.image)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("destination", UNIQUE))?;

        Ok(())
    }

    async fn update(&self, destination: &Destination) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE destinations
            SET name = $2, iata_code = $3, airport = $4, image = $5
            WHERE id = $1
            "#,
        )
        .bind(destination.id)
        .bind(&destination.name)
        .bind(&destination.iata_code)
        .bind(&destination.airport)
        .bind(&destination.image)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("destination", UNIQUE))?;

        if result.rows_affected() == 0 {
            return Err(ServerError::not_found("destination"));
        }

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<Option<Destination>> {
        let record = sqlx::query_as::<_, DestinationRecord>(
            r#"
            DELETE FROM destinations
            WHERE id = $1
            RETURNING id, name, iata_code, airport, image
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Destination::from))
    }
}
