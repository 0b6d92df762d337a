//! `/vuelos`: schedule, cancellation and seat self-assignment.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;

use super::{Valid, parse_id};
use crate::AppState;
use crate::error::Result;
use crate::flight::{FlightPatch, FlightService, FlightView, NewFlight, SeatRequest};
use crate::middleware::{Administrator, Authenticated, Viewer};

const KIND: &str = "flight";

/// Handler for `GET /vuelos`. Cancelled flights are administrator-only.
async fn list(
    State(flights): State<FlightService>,
    viewer: Viewer,
) -> Result<Json<Vec<FlightView>>> {
    flights.list(viewer.is_admin()).await.map(Json)
}

async fn get_one(
    State(flights): State<FlightService>,
    Path(id): Path<String>,
) -> Result<Json<FlightView>> {
    let id = parse_id(&id, KIND)?;
    flights.get(&id).await.map(Json)
}

async fn create(
    State(flights): State<FlightService>,
    Administrator(_): Administrator,
    Valid(body): Valid<NewFlight>,
) -> Result<(StatusCode, Json<FlightView>)> {
    let flight = flights.create(body).await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

async fn update(
    State(flights): State<FlightService>,
    Administrator(_): Administrator,
    Path(id): Path<String>,
    Valid(body): Valid<FlightPatch>,
) -> Result<Json<FlightView>> {
    let id = parse_id(&id, KIND)?;
    flights.update(&id, body).await.map(Json)
}

/// Handler for `GET /vuelos/{id}/cancelar`.
async fn cancel(
    State(flights): State<FlightService>,
    Administrator(admin): Administrator,
    Path(id): Path<String>,
) -> Result<Json<FlightView>> {
    let id = parse_id(&id, KIND)?;
    tracing::debug!(flight = %id, admin = %admin.id, "cancel requested");
    flights.cancel(&id).await.map(Json)
}

async fn delete(
    State(flights): State<FlightService>,
    Administrator(_): Administrator,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id, KIND)?;
    flights.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /vuelos/{id}`: the caller takes a seat.
async fn assign_seat(
    State(flights): State<FlightService>,
    Authenticated(identity): Authenticated,
    Path(id): Path<String>,
    Valid(body): Valid<SeatRequest>,
) -> Result<Json<FlightView>> {
    let id = parse_id(&id, KIND)?;
    flights
        .assign_seat(&id, &identity.id, &body.seat)
        .await
        .map(Json)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route(
            "/{id}",
            get(get_one).put(update).post(assign_seat).delete(delete),
        )
        .route("/{id}/cancelar", get(cancel))
}
