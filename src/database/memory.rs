//! In-process adapters, used by tests and database-less runs.
//!
//! Each check-then-write happens under one write lock, so uniqueness and
//! seat assignment stay atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CatalogRepository, FlightRepository, Redemption, SeatOutcome,
    UserRepository,
};
use crate::catalog::CatalogEntry;
use crate::error::{Result, ServerError};
use crate::flight::{Flight, FlightStatus, Passenger};
use crate::user::User;

#[derive(Debug, Default)]
pub struct MemoryUsers {
    users: RwLock<Vec<User>>,
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(ServerError::conflict("email"));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.token.as_deref() == Some(token))
            .cloned())
    }

    async fn issue_token(
        &self,
        id: &Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| &u.id == id)
            .ok_or_else(|| ServerError::not_found("user"))?;
        user.token = Some(token.to_owned());
        user.token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn redeem_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        redemption: &Redemption,
    ) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| {
            u.token.as_deref() == Some(token) && u.token_is_live(now)
        }) else {
            return Ok(None);
        };

        match redemption {
            Redemption::Confirm => user.confirmed = true,
            Redemption::Password(hash) => user.password = hash.clone(),
        }
        user.clear_token();
        Ok(Some(user.clone()))
    }
}

#[derive(Debug)]
pub struct MemoryCatalog<E> {
    entries: RwLock<Vec<E>>,
}

impl<E> Default for MemoryCatalog<E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

/// First unique field of `entry` already held by another entry.
fn clash<E: CatalogEntry>(entries: &[E], entry: &E) -> Option<&'static str> {
    let keys = entry.unique_keys();

    entries
        .iter()
        .filter(|other| other.id() != entry.id())
        .flat_map(|other| other.unique_keys())
        .find_map(|(field, value)| {
            keys.iter()
                .any(|(f, v)| *f == field && v.eq_ignore_ascii_case(&value))
                .then_some(field)
        })
}

#[async_trait]
impl<E: CatalogEntry> CatalogRepository<E> for MemoryCatalog<E> {
    async fn list(&self) -> Result<Vec<E>> {
        Ok(self.entries.read().await.clone())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<E>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| &e.id() == id).cloned())
    }

    async fn insert(&self, entry: &E) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(field) = clash(&entries, entry) {
            return Err(ServerError::conflict(format!("{} {field}", E::KIND)));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &E) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(field) = clash(&entries, entry) {
            return Err(ServerError::conflict(format!("{} {field}", E::KIND)));
        }
        let slot = entries
            .iter_mut()
            .find(|e| e.id() == entry.id())
            .ok_or_else(|| ServerError::not_found(E::KIND))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<Option<E>> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .iter()
            .position(|e| &e.id() == id)
            .map(|index| entries.remove(index)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlights {
    flights: RwLock<Vec<Flight>>,
}

#[async_trait]
impl FlightRepository for MemoryFlights {
    async fn list(&self, include_cancelled: bool) -> Result<Vec<Flight>> {
        let flights = self.flights.read().await;
        Ok(flights
            .iter()
            .filter(|f| {
                include_cancelled || f.info.status != FlightStatus::Cancelled
            })
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Flight>> {
        let flights = self.flights.read().await;
        Ok(flights.iter().find(|f| &f.id == id).cloned())
    }

    async fn insert(&self, flight: &Flight) -> Result<()> {
        let mut flights = self.flights.write().await;
        if flights.iter().any(|f| f.code == flight.code) {
            return Err(ServerError::conflict("flight"));
        }
        flights.push(flight.clone());
        Ok(())
    }

    async fn update(&self, flight: &Flight) -> Result<()> {
        let mut flights = self.flights.write().await;
        let slot = flights
            .iter_mut()
            .find(|f| f.id == flight.id)
            .ok_or_else(|| ServerError::not_found("flight"))?;

        let passengers = std::mem::take(&mut slot.info.passengers);
        let status = slot.info.status;
        *slot = flight.clone();
        slot.info.passengers = passengers;
        slot.info.status = status;
        Ok(())
    }

    async fn transition(
        &self,
        id: &Uuid,
        from: FlightStatus,
        to: FlightStatus,
    ) -> Result<bool> {
        let mut flights = self.flights.write().await;
        match flights
            .iter_mut()
            .find(|f| &f.id == id && f.info.status == from)
        {
            Some(flight) => {
                flight.info.status = to;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        let mut flights = self.flights.write().await;
        let before = flights.len();
        flights.retain(|f| &f.id != id);
        Ok(flights.len() != before)
    }

    async fn add_passenger(
        &self,
        id: &Uuid,
        passenger: &Passenger,
    ) -> Result<SeatOutcome> {
        let mut flights = self.flights.write().await;
        let Some(flight) = flights.iter_mut().find(|f| &f.id == id) else {
            return Ok(SeatOutcome::NoFlight);
        };

        if flight.seat_taken(&passenger.seat) {
            return Ok(SeatOutcome::Taken);
        }
        flight.info.passengers.push(passenger.clone());
        Ok(SeatOutcome::Assigned)
    }
}
