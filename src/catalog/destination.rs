use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::CatalogEntry;

/// Airport a flight departs from or lands at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub id: Uuid,
    pub name: String,
    pub iata_code: String,
    pub airport: String,
    pub image: Option<String>,
}

fn validate_iata(code: &str) -> Result<(), ValidationError> {
    let valid = regex_lite::Regex::new(r"^[A-Za-z]{3}$")
        .map(|re| re.is_match(code.trim()))
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("iata"))
    }
}

/// Fields accepted when registering a destination.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewDestination {
    #[serde(alias = "nombre", deserialize_with = "crate::trim::trimmed")]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be 1 to 100 characters long."
    ))]
    pub name: String,
    #[serde(alias = "codigoIATA")]
    #[validate(custom(
        function = "validate_iata",
        message = "IATA code must be three letters."
    ))]
    pub iata_code: String,
    #[serde(alias = "aeropuerto", deserialize_with = "crate::trim::trimmed")]
    #[validate(length(
        min = 1,
        max = 150,
        message = "Airport must be 1 to 150 characters long."
    ))]
    pub airport: String,
}

/// Fields a caller may change on a destination.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DestinationPatch {
    #[serde(
        alias = "nombre",
        default,
        deserialize_with = "crate::trim::trimmed_option"
    )]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be 1 to 100 characters long."
    ))]
    pub name: Option<String>,
    #[serde(alias = "codigoIATA")]
    #[validate(custom(
        function = "validate_iata",
        message = "IATA code must be three letters."
    ))]
    pub iata_code: Option<String>,
    #[serde(
        alias = "aeropuerto",
        default,
        deserialize_with = "crate::trim::trimmed_option"
    )]
    #[validate(length(
        min = 1,
        max = 150,
        message = "Airport must be 1 to 150 characters long."
    ))]
    pub airport: Option<String>,
}

fn normalize_iata(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl CatalogEntry for Destination {
    const KIND: &'static str = "destination";
    const DIRECTORY: &'static str = "destinos";
    const EXTENSIONS: &'static [&'static str] =
        &["jpeg", "jpg", "png", "avif", "webp"];
    const IMAGE_REQUIRED: bool = false;

    type Draft = NewDestination;
    type Patch = DestinationPatch;

    fn create(id: Uuid, draft: NewDestination, image: Option<String>) -> Self {
        Self {
            id,
            name: draft.name,
            iata_code: normalize_iata(&draft.iata_code),
            airport: draft.airport,
            image,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn set_image(&mut self, image: String) -> Option<String> {
        self.image.replace(image)
    }

    fn apply(&mut self, patch: DestinationPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(code) = patch.iata_code {
            self.iata_code = normalize_iata(&code);
        }
        if let Some(airport) = patch.airport {
            self.airport = airport;
        }
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("IATA code", self.iata_code.clone()),
        ]
    }
}
