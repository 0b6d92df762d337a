//! Persistence ports and their adapters.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::AppState;
use crate::catalog::{Airline, CatalogEntry, Destination};
use crate::error::Result;
use crate::flight::{Flight, FlightStatus, Passenger};
use crate::user::User;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "dorado";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Port for account persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn insert(&self, user: &User) -> Result<()>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find the account holding a confirmation or reset token.
    async fn find_by_token(&self, token: &str) -> Result<Option<User>>;

    /// Replace the pending token of account `id`. Other columns are left
    /// as stored.
    async fn issue_token(
        &self,
        id: &Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Burn `token` and apply `redemption` in one conditional write.
    ///
    /// Returns `None` when no account holds `token` or it expired before
    /// `now`, so a token is never redeemed twice.
    async fn redeem_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        redemption: &Redemption,
    ) -> Result<Option<User>>;
}

/// What redeeming a single-use token does to the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// Mark the account confirmed.
    Confirm,
    /// Store a new password hash.
    Password(String),
}

/// Port for airline and destination persistence.
#[async_trait]
pub trait CatalogRepository<E: CatalogEntry>: Send + Sync {
    async fn list(&self) -> Result<Vec<E>>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<E>>;

    /// Fails with `Conflict` when a unique field is taken.
    async fn insert(&self, entry: &E) -> Result<()>;

    /// Fails with `Conflict` or `NotFound`.
    async fn update(&self, entry: &E) -> Result<()>;

    /// Remove and return the entry, if it existed.
    async fn delete(&self, id: &Uuid) -> Result<Option<E>>;
}

/// Result of an atomic seat insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatOutcome {
    Assigned,
    Taken,
    NoFlight,
}

/// Port for flight persistence.
#[async_trait]
pub trait FlightRepository: Send + Sync {
    /// Flights in creation order, optionally without cancelled ones.
    async fn list(&self, include_cancelled: bool) -> Result<Vec<Flight>>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Flight>>;

    /// Fails with `Conflict` when the flight code is taken.
    async fn insert(&self, flight: &Flight) -> Result<()>;

    /// Save schedule and references. Status and passengers are left as
    /// stored; status changes go through [`FlightRepository::transition`].
    async fn update(&self, flight: &Flight) -> Result<()>;

    /// Set status to `to` only if it currently is `from`.
    async fn transition(
        &self,
        id: &Uuid,
        from: FlightStatus,
        to: FlightStatus,
    ) -> Result<bool>;

    async fn delete(&self, id: &Uuid) -> Result<bool>;

    /// Append a passenger unless the seat is already held.
    async fn add_passenger(
        &self,
        id: &Uuid,
        passenger: &Passenger,
    ) -> Result<SeatOutcome>;
}

/// Every repository the service needs.
#[derive(Clone)]
pub struct Database {
    pub users: Arc<dyn UserRepository>,
    pub airlines: Arc<dyn CatalogRepository<Airline>>,
    pub destinations: Arc<dyn CatalogRepository<Destination>>,
    pub flights: Arc<dyn FlightRepository>,
}

impl Database {
    /// Connect to PostgreSQL and run pending migrations.
    pub async fn postgres(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let pool =
            postgres::connect(hostname, username, password, db, pool).await?;

        // execute migrations scripts on start.
        sqlx::migrate!().run(&pool).await?;

        Ok(Self {
            users: Arc::new(postgres::PgUsers::new(pool.clone())),
            airlines: Arc::new(postgres::PgAirlines::new(pool.clone())),
            destinations: Arc::new(postgres::PgDestinations::new(pool.clone())),
            flights: Arc::new(postgres::PgFlights::new(pool)),
        })
    }

    /// In-process store, lost on exit.
    pub fn memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUsers::default()),
            airlines: Arc::new(memory::MemoryCatalog::<Airline>::default()),
            destinations: Arc::new(
                memory::MemoryCatalog::<Destination>::default(),
            ),
            flights: Arc::new(memory::MemoryFlights::default()),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
