//! HTTP API.
pub mod account;
pub mod catalog;
pub mod flights;
pub mod status;

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::upload::UploadedFile;

/// Multipart fields carrying the image.
const IMAGE_FIELDS: &[&str] = &["image", "imagen"];

/// Short confirmation returned by state-changing account routes.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Path identifiers are UUIDs; anything else cannot name a record.
pub fn parse_id(id: &str, kind: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| ServerError::not_found(kind))
}

/// JSON body checked with [`Validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Catalog body: either `multipart/form-data` with an optional image, or
/// plain JSON without one.
#[derive(Debug)]
pub struct Form<T> {
    pub data: T,
    pub file: Option<UploadedFile>,
}

impl<T, S> FromRequest<S> for Form<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Valid(data) = Valid::<T>::from_request(req, state).await?;
            return Ok(Form { data, file: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;

        let mut fields = Map::new();
        let mut file = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();

            if IMAGE_FIELDS.contains(&name.as_str()) {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await?;

                // browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            } else if !name.is_empty() {
                fields.insert(name, Value::String(field.text().await?));
            }
        }

        let data = serde_json::from_value::<T>(Value::Object(fields))
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;
        data.validate()?;

        Ok(Form { data, file })
    }
}
