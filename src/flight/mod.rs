//! Flights, their schedule and passenger seats.

mod service;

pub use service::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::catalog::{Airline, Destination};
use crate::user::PublicUser;

/// Lifecycle of a flight.
///
/// `Pending -> Active -> Completed`, and `Pending -> Cancelled`. Nothing
/// goes backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightStatus {
    #[default]
    #[serde(alias = "Pendiente", alias = "pending")]
    Pending,
    #[serde(alias = "Activo", alias = "active")]
    Active,
    #[serde(alias = "Realizado", alias = "completed")]
    Completed,
    #[serde(alias = "Cancelado", alias = "cancelled")]
    Cancelled,
}

impl FlightStatus {
    pub fn can_transition_to(self, next: FlightStatus) -> bool {
        use FlightStatus::*;

        matches!(
            (self, next),
            (Pending, Active) | (Active, Completed) | (Pending, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Pending => "Pending",
            FlightStatus::Active => "Active",
            FlightStatus::Completed => "Completed",
            FlightStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(FlightStatus::Pending),
            "Active" => Ok(FlightStatus::Active),
            "Completed" => Ok(FlightStatus::Completed),
            "Cancelled" => Ok(FlightStatus::Cancelled),
            other => Err(format!("unknown flight status `{other}`")),
        }
    }
}

/// Seat held by a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    pub user: Uuid,
    pub seat: String,
}

/// Schedule and references of a flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightInfo {
    pub airline: Uuid,
    pub origin: Uuid,
    pub destination: Uuid,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub status: FlightStatus,
    /// In assignment order.
    pub passengers: Vec<Passenger>,
}

/// Flight as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    /// Public flight identifier, e.g. `LA2047`.
    pub code: String,
    pub info: FlightInfo,
}

impl Flight {
    pub fn seat_taken(&self, seat: &str) -> bool {
        self.info.passengers.iter().any(|p| p.seat == seat)
    }
}

fn validate_code(code: &str) -> Result<(), ValidationError> {
    let valid = regex_lite::Regex::new(r"^[A-Za-z0-9-]{2,10}$")
        .map(|re| re.is_match(code.trim()))
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("flight_code"))
    }
}

fn validate_schedule(info: &NewFlightInfo) -> Result<(), ValidationError> {
    if info.arrival > info.departure {
        Ok(())
    } else {
        Err(ValidationError::new("schedule")
            .with_message("Arrival must be after departure.".into()))
    }
}

/// Body of `POST /vuelos`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewFlight {
    #[serde(alias = "idVuelo")]
    #[validate(custom(
        function = "validate_code",
        message = "Flight identifier must be 2 to 10 letters or digits."
    ))]
    pub flight_id: String,
    #[serde(alias = "infoVuelo")]
    #[validate(nested)]
    pub info: NewFlightInfo,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_schedule"))]
pub struct NewFlightInfo {
    #[serde(alias = "aerolinea")]
    pub airline: Uuid,
    #[serde(alias = "origen")]
    pub origin: Uuid,
    #[serde(alias = "destino")]
    pub destination: Uuid,
    #[serde(alias = "fechaSalida")]
    pub departure: DateTime<Utc>,
    #[serde(alias = "fechaLlegada")]
    pub arrival: DateTime<Utc>,
}

/// Body of `PUT /vuelos/{id}`. The flight identifier cannot change.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FlightPatch {
    #[serde(default, alias = "infoVuelo")]
    pub info: FlightInfoPatch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightInfoPatch {
    #[serde(alias = "aerolinea")]
    pub airline: Option<Uuid>,
    #[serde(alias = "origen")]
    pub origin: Option<Uuid>,
    #[serde(alias = "destino")]
    pub destination: Option<Uuid>,
    #[serde(alias = "fechaSalida")]
    pub departure: Option<DateTime<Utc>>,
    #[serde(alias = "fechaLlegada")]
    pub arrival: Option<DateTime<Utc>>,
    #[serde(alias = "estado")]
    pub status: Option<FlightStatus>,
}

impl FlightInfo {
    /// Overwrite supplied fields. Status is left to the caller, which must
    /// check the transition first.
    pub fn apply(&mut self, patch: &FlightInfoPatch) {
        if let Some(airline) = patch.airline {
            self.airline = airline;
        }
        if let Some(origin) = patch.origin {
            self.origin = origin;
        }
        if let Some(destination) = patch.destination {
            self.destination = destination;
        }
        if let Some(departure) = patch.departure {
            self.departure = departure;
        }
        if let Some(arrival) = patch.arrival {
            self.arrival = arrival;
        }
    }
}

/// Body of `POST /vuelos/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct SeatRequest {
    #[serde(alias = "asiento")]
    #[validate(length(
        min = 1,
        max = 8,
        message = "Seat must be 1 to 8 characters long."
    ))]
    pub seat: String,
}

/// Flight with its references resolved.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightView {
    pub id: Uuid,
    pub flight_id: String,
    pub info: FlightInfoView,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightInfoView {
    /// `None` when the airline has since been deleted.
    pub airline: Option<Airline>,
    pub origin: Option<Destination>,
    pub destination: Option<Destination>,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub status: FlightStatus,
    /// Hidden on listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passengers: Option<Vec<PassengerView>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PassengerView {
    pub user: Option<PublicUser>,
    pub seat: String,
}
