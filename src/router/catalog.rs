//! `/aerolineas` and `/destinos`.
//!
//! Both kinds share one generic router; reads are public, writes need an
//! administrator and take either multipart (with an image) or JSON.

use axum::Json;
use axum::Router;
use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};

use super::{Form, parse_id};
use crate::AppState;
use crate::catalog::{CatalogEntry, CatalogService};
use crate::error::Result;
use crate::middleware::Administrator;

async fn list<E: CatalogEntry>(
    State(catalog): State<CatalogService<E>>,
) -> Result<Json<Vec<E>>> {
    catalog.list().await.map(Json)
}

async fn create<E: CatalogEntry>(
    State(catalog): State<CatalogService<E>>,
    Administrator(admin): Administrator,
    form: Form<E::Draft>,
) -> Result<(StatusCode, Json<E>)> {
    tracing::debug!(kind = E::KIND, admin = %admin.id, "creating catalog entry");
    let entry = catalog.create(form.data, form.file).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update<E: CatalogEntry>(
    State(catalog): State<CatalogService<E>>,
    Administrator(_): Administrator,
    Path(id): Path<String>,
    form: Form<E::Patch>,
) -> Result<Json<E>> {
    let id = parse_id(&id, E::KIND)?;
    catalog.update(&id, form.data, form.file).await.map(Json)
}

async fn delete<E: CatalogEntry>(
    State(catalog): State<CatalogService<E>>,
    Administrator(_): Administrator,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id, E::KIND)?;
    catalog.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router<E>() -> Router<AppState>
where
    E: CatalogEntry,
    CatalogService<E>: FromRef<AppState>,
{
    Router::new()
        .route("/", get(list::<E>).post(create::<E>))
        .route("/{id}", put(update::<E>).delete(delete::<E>))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;

    use crate::app;
    use crate::tests::{
        make_multipart_request, make_request, multipart, read_json, sign_in,
        state,
    };
    use crate::user::Role;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    #[tokio::test]
    async fn test_destination_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let app = app(state.clone());
        let admin = sign_in(&state, "root", Role::Administrator).await;

        let body = multipart(
            &[("nombre", "Lima"), ("codigoIATA", "lim"), ("aeropuerto", "Jorge Chávez")],
            Some(("lima.jpg", "image/jpeg", JPEG)),
        );
        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/destinos",
            body,
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let lima = read_json(response).await;
        assert_eq!(lima["iataCode"], "LIM");
        let image = lima["image"].as_str().unwrap().to_owned();
        assert!(image.ends_with(".jpg"));

        let served = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/imagenes/destinos/{image}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(served.status(), StatusCode::OK);

        // same IATA code under another name.
        let body = multipart(
            &[("nombre", "Callao"), ("codigoIATA", "LIM"), ("aeropuerto", "Callao")],
            Some(("callao.png", "image/png", JPEG)),
        );
        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/destinos",
            body,
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            std::fs::read_dir(dir.path().join("destinos")).unwrap().count(),
            1
        );

        let response = make_request(
            app.clone(),
            Method::GET,
            "/dorado/destinos",
            String::new(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await.as_array().unwrap().len(), 1);

        let path = format!("/dorado/destinos/{}", lima["id"].as_str().unwrap());
        let response = make_request(
            app.clone(),
            Method::PUT,
            &path,
            json!({ "airport": "Aeropuerto Internacional Jorge Chávez" })
                .to_string(),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_eq!(updated["name"], "Lima");
        assert_eq!(updated["image"], image.as_str());

        let response = make_request(
            app.clone(),
            Method::DELETE,
            &path,
            String::new(),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response =
            make_request(app, Method::DELETE, &path, String::new(), Some(&admin))
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_catalog_writes_need_administrator() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let app = app(state.clone());
        let user = sign_in(&state, "ana", Role::Standard).await;

        let body = json!({ "name": "Cusco", "iataCode": "CUZ", "airport": "Velasco Astete" })
            .to_string();
        let response = make_request(
            app.clone(),
            Method::POST,
            "/dorado/destinos",
            body.clone(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            app,
            Method::POST,
            "/dorado/destinos",
            body,
            Some(&user),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_airline_upload_rules() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let app = app(state.clone());
        let admin = sign_in(&state, "root", Role::Administrator).await;

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/aerolineas",
            multipart(&[("nombre", "Dorado Air")], None),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/aerolineas",
            multipart(
                &[("nombre", "   ")],
                Some(("logo.png", "image/png", JPEG)),
            ),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(std::fs::read_dir(dir.path().join("aerolineas")).is_err());

        // destinations accept webp, airlines do not.
        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/aerolineas",
            multipart(
                &[("nombre", "Dorado Air")],
                Some(("logo.webp", "image/webp", JPEG)),
            ),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/aerolineas",
            multipart(
                &[("nombre", "Dorado Air")],
                Some(("logo.png", "image/png", JPEG)),
            ),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let airline = read_json(response).await;

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/dorado/aerolineas",
            multipart(
                &[("nombre", "DORADO AIR")],
                Some(("logo.png", "image/png", JPEG)),
            ),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // new image replaces the old file.
        let path = format!("/dorado/aerolineas/{}", airline["id"].as_str().unwrap());
        let response = make_multipart_request(
            app,
            Method::PUT,
            &path,
            multipart(&[], Some(("logo.jpeg", "image/jpeg", JPEG))),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_ne!(updated["image"], airline["image"]);

        let files = std::fs::read_dir(dir.path().join("aerolineas"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(files, vec![updated["image"].as_str().unwrap().to_owned()]);
    }

    #[tokio::test]
    async fn test_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let admin = sign_in(&state, "root", Role::Administrator).await;

        let response = make_request(
            app(state),
            Method::DELETE,
            "/dorado/aerolineas/not-a-uuid",
            String::new(),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
