//! Dorado is an airline booking API: accounts, airlines, destinations and
//! flights.

#![forbid(unsafe_code)]
pub mod catalog;
pub mod config;
mod crypto;
pub mod database;
pub mod error;
pub mod flight;
mod mail;
mod middleware;
mod router;
pub mod telemetry;
mod token;
mod trim;
pub mod upload;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::catalog::{Airline, CatalogEntry, CatalogService, Destination};
use crate::config::Configuration;
use crate::database::Database;
use crate::flight::FlightService;
use crate::mail::MailManager;
use crate::upload::UploadPolicy;
use crate::user::UserService;

pub use error::ServerError;

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub db: Database,
    pub users: UserService,
    pub airlines: CatalogService<Airline>,
    pub destinations: CatalogService<Destination>,
    pub flights: FlightService,
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for CatalogService<Airline> {
    fn from_ref(state: &AppState) -> Self {
        state.airlines.clone()
    }
}

impl FromRef<AppState> for CatalogService<Destination> {
    fn from_ref(state: &AppState) -> Self {
        state.destinations.clone()
    }
}

impl FromRef<AppState> for FlightService {
    fn from_ref(state: &AppState) -> Self {
        state.flights.clone()
    }
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl AppState {
    /// Wire services on top of `db`.
    pub fn new(
        config: Arc<Configuration>,
        db: Database,
        mail: MailManager,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone())?);

        let secret = if config.token.secret.is_empty() {
            tracing::warn!(
                "no session secret configured, sessions end with the process"
            );
            crypto::opaque_token()
        } else {
            config.token.secret.clone()
        };
        let token = token::TokenManager::new(
            &config.url,
            &secret,
            config.token.expiration,
        );

        let users = UserService::new(
            Arc::clone(&db.users),
            crypto,
            mail,
            token,
            config.opaque_token_ttl,
        );
        let airlines = CatalogService::new(
            Arc::clone(&db.airlines),
            images::<Airline>(&config),
        );
        let destinations = CatalogService::new(
            Arc::clone(&db.destinations),
            images::<Destination>(&config),
        );
        let flights = FlightService::new(
            Arc::clone(&db.flights),
            Arc::clone(&db.airlines),
            Arc::clone(&db.destinations),
            Arc::clone(&db.users),
        );

        Ok(Self {
            config,
            db,
            users,
            airlines,
            destinations,
            flights,
            metrics,
        })
    }
}

fn images<E: CatalogEntry>(config: &Configuration) -> UploadPolicy {
    UploadPolicy::images(config.uploads.path.join(E::DIRECTORY), E::EXTENSIONS)
        .naming(config.uploads.naming)
}

fn cors(config: &Configuration) -> CorsLayer {
    let origins = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .vary([header::AUTHORIZATION])
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(
                    |chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                        tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                    },
                )
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        // Add CORS preflight support.
        .layer(cors(&config));

    let api = Router::new()
        .merge(router::account::router())
        .nest("/aerolineas", router::catalog::router::<Airline>())
        .nest("/destinos", router::catalog::router::<Destination>())
        .nest("/vuelos", router::flights::router());

    let base_path = config.base_path.trim_end_matches('/');
    let routes = if base_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(base_path, api)
    };

    routes
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .with_state(state.clone())
        .nest_service("/imagenes", ServeDir::new(&config.uploads.path))
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(AxumMiddleware::from_fn_with_state(
            state,
            middleware::origin_gate,
        ))
        .layer(DefaultBodyLimit::max(config.uploads.max_size))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<Configuration>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let db = match config.postgres {
        Some(ref pg) => {
            Database::postgres(
                &pg.address,
                pg.username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                pg.password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                pg.database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                pg.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, data is kept in memory"
            );
            Database::memory()
        },
    };

    // handle mail sender.
    let mail = if let Some(cfg) = &config.mail {
        MailManager::new(cfg).await?
    } else {
        MailManager::default()
    };

    AppState::new(config, db, mail, metrics)
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::Response;
    use tower::util::ServiceExt;

    use super::*;
    use crate::crypto::PasswordManager;
    use crate::database::UserRepository;
    use crate::user::{Role, User};

    pub const BOUNDARY: &str = "dorado-test-boundary";

    /// In-memory state with cheap hashing and a throwaway upload root.
    pub fn state(uploads: &std::path::Path) -> AppState {
        let mut config = Configuration::default();
        config.token.secret = "test-secret".into();
        config.uploads.path = uploads.to_path_buf();
        config.cors.allowed_origins = vec!["http://localhost:5173".into()];
        config.argon2 = Some(crate::config::Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        });

        AppState::new(
            Arc::new(config),
            Database::memory(),
            MailManager::default(),
            None,
        )
        .unwrap()
    }

    /// Insert a confirmed account and return its session token.
    pub async fn sign_in(state: &AppState, name: &str, role: Role) -> String {
        let password = "Jorge-Chavez-1960";
        let hash = PasswordManager::new(state.config.argon2.clone())
            .unwrap()
            .hash_password(password)
            .unwrap();
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: format!("{name}@dorado.test"),
            name: name.into(),
            role,
            password: hash,
            confirmed: true,
            token: None,
            token_expires_at: None,
            created_at: chrono::Utc::now(),
        };
        state.db.users.insert(&user).await.unwrap();

        state
            .users
            .authenticate(&user.email, password)
            .await
            .unwrap()
            .token
    }

    pub async fn read_json(response: Response<Body>) -> serde_json::Value {
        use http_body_util::BodyExt;

        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    /// MUST NEVER be used in production.
    pub async fn make_request(
        app: Router,
        method: Method,
        path: &str,
        body: String,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        app.oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    /// Multipart body with text `fields` and an optional
    /// `(file name, media type, bytes)` image part.
    pub fn multipart(
        fields: &[(&str, &str)],
        image: Option<(&str, &str, &[u8])>,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, media, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"imagen\"; filename=\"{file_name}\"\r\n\
                     Content-Type: {media}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    pub async fn make_multipart_request(
        app: Router,
        method: Method,
        path: &str,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut req = Request::builder().method(method).uri(path).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        app.oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_and_origin_gate() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(dir.path()));

        let response = make_request(
            app.clone(),
            Method::GET,
            "/status.json",
            String::new(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/dorado/vuelos")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );

        let rejected = app
            .oneshot(
                Request::builder()
                    .uri("/dorado/vuelos")
                    .header(header::ORIGIN, "https://evil.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let response = make_request(
            app(state(dir.path())),
            Method::GET,
            "/metrics",
            String::new(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
