//! Account lifecycle: registration, confirmation, login, password reset.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Message, Valid};
use crate::AppState;
use crate::error::Result;
use crate::middleware::Authenticated;
use crate::user::{Identity, Session, UserService};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterBody {
    #[serde(alias = "nombre", deserialize_with = "crate::trim::trimmed")]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be 1 to 100 characters long."
    ))]
    pub name: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ForgotBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetBody {
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

/// Handler for `POST /register`.
async fn register(
    State(users): State<UserService>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<Message>)> {
    users.register(&body.name, &body.email, &body.password).await?;

    Ok((
        StatusCode::CREATED,
        Message::new("Account created. Check your email to confirm it."),
    ))
}

/// Handler for `POST /login`.
async fn login(
    State(users): State<UserService>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<Session>> {
    users.authenticate(&body.email, &body.password).await.map(Json)
}

/// Handler for `GET /confirm/{token}`.
async fn confirm(
    State(users): State<UserService>,
    Path(token): Path<String>,
) -> Result<Json<Message>> {
    users.confirm(&token).await?;
    Ok(Message::new("Account confirmed."))
}

/// Handler for `POST /forgot-password`.
async fn forgot_password(
    State(users): State<UserService>,
    Valid(body): Valid<ForgotBody>,
) -> Result<Json<Message>> {
    users.request_password_reset(&body.email).await?;
    Ok(Message::new("An email with instructions has been sent."))
}

/// Handler for `GET /forgot-password/{token}`.
async fn check_token(
    State(users): State<UserService>,
    Path(token): Path<String>,
) -> Result<Json<Message>> {
    users.check_reset_token(&token).await?;
    Ok(Message::new("Valid token."))
}

/// Handler for `POST /forgot-password/{token}`.
async fn reset_password(
    State(users): State<UserService>,
    Path(token): Path<String>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<Message>> {
    users.reset_password(&token, &body.password).await?;
    Ok(Message::new("Password updated."))
}

/// Handler for `GET /profile`.
async fn profile(Authenticated(identity): Authenticated) -> Json<Identity> {
    Json(identity)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/confirm/{token}", get(confirm))
        .route("/forgot-password", post(forgot_password))
        .route(
            "/forgot-password/{token}",
            get(check_token).post(reset_password),
        )
        .route("/profile", get(profile))
}
