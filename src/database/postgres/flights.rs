use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::conflict_on;
use crate::database::{FlightRepository, SeatOutcome};
use crate::error::{Result, ServerError};
use crate::flight::{Flight, FlightInfo, FlightStatus, Passenger};

const COLUMNS: &str =
    "id, code, airline, origin, destination, departure, arrival, status";

#[derive(Debug, FromRow)]
struct FlightRecord {
    id: Uuid,
    code: String,
    airline: Uuid,
    origin: Uuid,
    destination: Uuid,
    departure: DateTime<Utc>,
    arrival: DateTime<Utc>,
    status: String,
}

#[derive(Debug, FromRow)]
struct PassengerRecord {
    flight_id: Uuid,
    user_id: Uuid,
    seat: String,
}

impl FlightRecord {
    fn into_flight(self, passengers: Vec<Passenger>) -> Result<Flight> {
        let status =
            self.status.parse::<FlightStatus>().map_err(|err| {
                ServerError::Internal {
                    details: err,
                    source: None,
                }
            })?;

        Ok(Flight {
            id: self.id,
            code: self.code,
            info: FlightInfo {
                airline: self.airline,
                origin: self.origin,
                destination: self.destination,
                departure: self.departure,
                arrival: self.arrival,
                status,
                passengers,
            },
        })
    }
}

/// PostgreSQL flight repository.
pub struct PgFlights {
    pool: PgPool,
}

impl PgFlights {
    /// Create a new [`PgFlights`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn passengers_of(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Passenger>>> {
        let records = sqlx::query_as::<_, PassengerRecord>(
            r#"
            SELECT flight_id, user_id, seat
            FROM passengers
            WHERE flight_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut passengers: HashMap<Uuid, Vec<Passenger>> = HashMap::new();
        for record in records {
            passengers.entry(record.flight_id).or_default().push(Passenger {
                user: record.user_id,
                seat: record.seat,
            });
        }

        Ok(passengers)
    }
}

#[async_trait]
impl FlightRepository for PgFlights {
    async fn list(&self, include_cancelled: bool) -> Result<Vec<Flight>> {
        let records = sqlx::query_as::<_, FlightRecord>(&format!(
            "SELECT {COLUMNS} FROM flights WHERE $1 OR status <> 'Cancelled' \
             ORDER BY created_at"
        ))
        .bind(include_cancelled)
        .fetch_all(&self.pool)
        .await?;

        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();
        let mut passengers = self.passengers_of(&ids).await?;

        records
            .into_iter()
            .map(|record| {
                let seats = passengers.remove(&record.id).unwrap_or_default();
                record.into_flight(seats)
            })
            .collect()
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Flight>> {
        let Some(record) = sqlx::query_as::<_, FlightRecord>(&format!(
            "SELECT {COLUMNS} FROM flights WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let seats = self
            .passengers_of(&[record.id])
            .await?
            .remove(&record.id)
            .unwrap_or_default();

        record.into_flight(seats).map(Some)
    }

    async fn insert(&self, flight: &Flight) -> Result<()> {
        let info = &flight.info;

        sqlx::query(
            r#"
            INSERT INTO flights (
                id, code, airline, origin, destination,
                departure, arrival, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.code)
        .bind(info.airline)
        .bind(info.origin)
        .bind(info.destination)
        .bind(info.departure)
        .bind(info.arrival)
        .bind(info.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(conflict_on("flight", &[]))?;

        Ok(())
    }

    async fn update(&self, flight: &Flight) -> Result<()> {
        let info = &flight.info;

        let result = sqlx::query(
            r#"
            UPDATE flights
            SET
                airline = $2,
                origin = $3,
                destination = $4,
                departure = $5,
                arrival = $6
            WHERE id = $1
            "#,
        )
        .bind(flight.id)
        .bind(info.airline)
        .bind(info.origin)
        .bind(info.destination)
        .bind(info.departure)
        .bind(info.arrival)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::not_found("flight"));
        }

        Ok(())
    }

    async fn transition(
        &self,
        id: &Uuid,
        from: FlightStatus,
        to: FlightStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE flights SET status = $3 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flights WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_passenger(
        &self,
        id: &Uuid,
        passenger: &Passenger,
    ) -> Result<SeatOutcome> {
        // The unique (flight_id, seat) pair makes this a single
        // append-if-absent.
        let result = sqlx::query(
            r#"
            INSERT INTO passengers (flight_id, user_id, seat)
            SELECT $1, $2, $3
            WHERE EXISTS (SELECT 1 FROM flights WHERE id = $1)
            ON CONFLICT (flight_id, seat) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(passenger.user)
        .bind(&passenger.seat)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) if result.rows_affected() == 1 => {
                Ok(SeatOutcome::Assigned)
            },
            Ok(_) => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM flights WHERE id = $1)",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

                Ok(if exists {
                    SeatOutcome::Taken
                } else {
                    SeatOutcome::NoFlight
                })
            },
            // flight deleted between the check and the insert.
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|e| e.is_foreign_key_violation()) =>
            {
                Ok(SeatOutcome::NoFlight)
            },
            Err(err) => Err(err.into()),
        }
    }
}
