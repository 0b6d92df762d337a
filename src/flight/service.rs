use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use super::{
    Flight, FlightInfo, FlightInfoView, FlightPatch, FlightStatus, FlightView,
    NewFlight, Passenger, PassengerView,
};
use crate::catalog::{Airline, Destination};
use crate::database::{
    CatalogRepository, FlightRepository, SeatOutcome, UserRepository,
};
use crate::error::{Result, ServerError};
use crate::user::PublicUser;

/// Flight scheduling, cancellation and seat assignment.
#[derive(Clone)]
pub struct FlightService {
    flights: Arc<dyn FlightRepository>,
    airlines: Arc<dyn CatalogRepository<Airline>>,
    destinations: Arc<dyn CatalogRepository<Destination>>,
    users: Arc<dyn UserRepository>,
}

/// Catalog entries loaded once for a batch of flights.
struct References {
    airlines: HashMap<Uuid, Airline>,
    destinations: HashMap<Uuid, Destination>,
}

impl References {
    fn view(&self, flight: Flight, passengers: Option<Vec<PassengerView>>) -> FlightView {
        let info = flight.info;
        FlightView {
            id: flight.id,
            flight_id: flight.code,
            info: FlightInfoView {
                airline: self.airlines.get(&info.airline).cloned(),
                origin: self.destinations.get(&info.origin).cloned(),
                destination: self.destinations.get(&info.destination).cloned(),
                departure: info.departure,
                arrival: info.arrival,
                status: info.status,
                passengers,
            },
        }
    }
}

impl FlightService {
    /// Create a new [`FlightService`].
    pub fn new(
        flights: Arc<dyn FlightRepository>,
        airlines: Arc<dyn CatalogRepository<Airline>>,
        destinations: Arc<dyn CatalogRepository<Destination>>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            flights,
            airlines,
            destinations,
            users,
        }
    }

    async fn references(&self) -> Result<References> {
        Ok(References {
            airlines: self
                .airlines
                .list()
                .await?
                .into_iter()
                .map(|a| (a.id, a))
                .collect(),
            destinations: self
                .destinations
                .list()
                .await?
                .into_iter()
                .map(|d| (d.id, d))
                .collect(),
        })
    }

    /// References of `flight`, without the passenger list.
    async fn references_of(&self, info: &FlightInfo) -> Result<References> {
        let mut refs = References {
            airlines: HashMap::new(),
            destinations: HashMap::new(),
        };
        if let Some(airline) = self.airlines.find_by_id(&info.airline).await? {
            refs.airlines.insert(airline.id, airline);
        }
        for id in [info.origin, info.destination] {
            if let Some(dest) = self.destinations.find_by_id(&id).await? {
                refs.destinations.insert(dest.id, dest);
            }
        }
        Ok(refs)
    }

    /// Referenced airline and airports must exist.
    async fn check_references(&self, info: &FlightInfo) -> Result<()> {
        if self.airlines.find_by_id(&info.airline).await?.is_none() {
            return Err(ServerError::not_found("airline"));
        }
        if self.destinations.find_by_id(&info.origin).await?.is_none() {
            return Err(ServerError::not_found("origin"));
        }
        if self.destinations.find_by_id(&info.destination).await?.is_none() {
            return Err(ServerError::not_found("destination"));
        }
        Ok(())
    }

    async fn find(&self, id: &Uuid) -> Result<Flight> {
        self.flights
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::not_found("flight"))
    }

    async fn resolved(&self, flight: Flight) -> Result<FlightView> {
        let refs = self.references_of(&flight.info).await?;
        Ok(refs.view(flight, None))
    }

    /// Schedule a new flight, always `Pending`.
    pub async fn create(&self, new: NewFlight) -> Result<FlightView> {
        let info = new.info;
        let flight = Flight {
            id: Uuid::new_v4(),
            code: new.flight_id.trim().to_uppercase(),
            info: FlightInfo {
                airline: info.airline,
                origin: info.origin,
                destination: info.destination,
                departure: info.departure,
                arrival: info.arrival,
                status: FlightStatus::Pending,
                passengers: Vec::new(),
            },
        };

        self.check_references(&flight.info).await?;
        self.flights.insert(&flight).await?;

        tracing::info!(flight = %flight.code, "flight scheduled");
        self.resolved(flight).await
    }

    /// Every flight, passengers hidden. Cancelled ones only for
    /// administrators.
    pub async fn list(&self, include_cancelled: bool) -> Result<Vec<FlightView>> {
        let flights = self.flights.list(include_cancelled).await?;
        let refs = self.references().await?;

        Ok(flights
            .into_iter()
            .map(|flight| refs.view(flight, None))
            .collect())
    }

    /// One flight with its passengers.
    pub async fn get(&self, id: &Uuid) -> Result<FlightView> {
        let mut flight = self.find(id).await?;
        let refs = self.references_of(&flight.info).await?;

        let mut passengers = Vec::with_capacity(flight.info.passengers.len());
        for Passenger { user, seat } in std::mem::take(&mut flight.info.passengers)
        {
            let user = self.users.find_by_id(&user).await?.map(PublicUser::from);
            passengers.push(PassengerView { user, seat });
        }

        Ok(refs.view(flight, Some(passengers)))
    }

    /// Merge `patch` into the flight. A status change must be a legal
    /// transition.
    pub async fn update(&self, id: &Uuid, patch: FlightPatch) -> Result<FlightView> {
        let mut flight = self.find(id).await?;
        let patch = patch.info;

        flight.info.apply(&patch);
        if flight.info.arrival <= flight.info.departure {
            let mut errors = ValidationErrors::new();
            errors.add(
                "arrival",
                ValidationError::new("schedule")
                    .with_message("Arrival must be after departure.".into()),
            );
            return Err(errors.into());
        }

        let requested = match patch.status {
            Some(status) if status == flight.info.status => None,
            Some(status) if flight.info.status.can_transition_to(status) => {
                Some(status)
            },
            Some(status) => {
                return Err(ServerError::InvalidState {
                    from: flight.info.status,
                    to: status,
                });
            },
            None => None,
        };

        self.check_references(&flight.info).await?;

        // Status only moves through the conditional write, so a concurrent
        // cancel is never overwritten.
        if let Some(status) = requested {
            let current = flight.info.status;
            if !self.flights.transition(id, current, status).await? {
                let stored = self.find(id).await?;
                return Err(ServerError::InvalidState {
                    from: stored.info.status,
                    to: status,
                });
            }
        }
        self.flights.update(&flight).await?;

        let flight = self.find(id).await?;
        self.resolved(flight).await
    }

    /// `Pending -> Cancelled`. A second cancel fails.
    pub async fn cancel(&self, id: &Uuid) -> Result<FlightView> {
        let cancelled = self
            .flights
            .transition(id, FlightStatus::Pending, FlightStatus::Cancelled)
            .await?;

        let flight = self.find(id).await?;
        if !cancelled {
            return Err(ServerError::InvalidState {
                from: flight.info.status,
                to: FlightStatus::Cancelled,
            });
        }

        metrics::counter!("flights_cancelled_total").increment(1);
        tracing::info!(flight = %flight.code, "flight cancelled");
        self.resolved(flight).await
    }

    pub async fn delete(&self, id: &Uuid) -> Result<()> {
        if !self.flights.delete(id).await? {
            return Err(ServerError::not_found("flight"));
        }
        Ok(())
    }

    /// Give `seat` to `user` unless someone already holds it.
    pub async fn assign_seat(
        &self,
        id: &Uuid,
        user: &Uuid,
        seat: &str,
    ) -> Result<FlightView> {
        if self.users.find_by_id(user).await?.is_none() {
            return Err(ServerError::not_found("user"));
        }

        let passenger = Passenger {
            user: *user,
            seat: seat.trim().to_uppercase(),
        };
        match self.flights.add_passenger(id, &passenger).await? {
            SeatOutcome::Assigned => {
                metrics::counter!("seat_assignments_total").increment(1);
                tracing::info!(flight = %id, seat = passenger.seat, "seat assigned");
                self.get(id).await
            },
            SeatOutcome::Taken => Err(ServerError::conflict("seat")),
            SeatOutcome::NoFlight => Err(ServerError::not_found("flight")),
        }
    }
}
