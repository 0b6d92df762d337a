use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::CatalogEntry;

/// Carrier operating flights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Airline {
    pub id: Uuid,
    pub name: String,
    /// File name under the airline upload directory.
    pub image: String,
}

/// Fields accepted when registering an airline.
#[derive(Debug, Deserialize, Validate)]
pub struct NewAirline {
    #[serde(alias = "nombre", deserialize_with = "crate::trim::trimmed")]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be 1 to 100 characters long."
    ))]
    pub name: String,
}

/// Fields a caller may change on an airline.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct AirlinePatch {
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
}

impl CatalogEntry for Airline {
    const KIND: &'static str = "airline";
    const DIRECTORY: &'static str = "aerolineas";
    const EXTENSIONS: &'static [&'static str] = &["jpeg", "jpg", "png"];
    const IMAGE_REQUIRED: bool = true;

    type Draft = NewAirline;
    type Patch = AirlinePatch;

    fn create(id: Uuid, draft: NewAirline, image: Option<String>) -> Self {
        Self {
            id,
            name: draft.name,
            image: image.unwrap_or_default(),
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn image(&self) -> Option<&str> {
        Some(self.image.as_str()).filter(|image| !image.is_empty())
    }

    fn set_image(&mut self, image: String) -> Option<String> {
        let previous = std::mem::replace(&mut self.image, image);
        Some(previous).filter(|image| !image.is_empty())
    }

    fn apply(&mut self, patch: AirlinePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_only_touches_supplied_fields() {
        let draft: NewAirline =
            serde_json::from_value(serde_json::json!({ "name": " LATAM " }))
                .unwrap();
        let mut airline =
            Airline::create(Uuid::new_v4(), draft, Some("latam.png".into()));
        assert_eq!(airline.name, "LATAM");

        airline.apply(AirlinePatch::default());
        assert_eq!(airline.name, "LATAM");

        airline.apply(AirlinePatch {
            name: Some("Sky Airline".into()),
        });
        assert_eq!(airline.name, "Sky Airline");
        assert_eq!(airline.image(), Some("latam.png"));
    }

    #[test]
    fn test_set_image_returns_previous() {
        let mut airline = Airline {
            id: Uuid::new_v4(),
            name: "Avianca".into(),
            image: "old.png".into(),
        };

        assert_eq!(airline.set_image("new.png".into()), Some("old.png".into()));
        assert_eq!(airline.image, "new.png");
    }

    #[test]
    fn test_legacy_field_name() {
        let draft: NewAirline =
            serde_json::from_value(serde_json::json!({ "nombre": "JetSMART" }))
                .unwrap();
        assert_eq!(draft.name, "JetSMART");
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let draft: NewAirline =
            serde_json::from_value(serde_json::json!({ "nombre": "   " }))
                .unwrap();
        assert!(draft.validate().unwrap_err().field_errors().contains_key("name"));

        let patch: AirlinePatch =
            serde_json::from_value(serde_json::json!({ "name": "\t " })).unwrap();
        assert!(patch.validate().is_err());

        let patch: AirlinePatch =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(patch.validate().is_ok());
        assert_eq!(patch.name, None);
    }
}
