//! Airlines and destinations: reference data with an attached image.

mod airline;
mod destination;

pub use airline::*;
pub use destination::*;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use crate::database::CatalogRepository;
use crate::error::{Result, ServerError};
use crate::upload::{UploadPolicy, UploadedFile};

/// Record managed by a [`CatalogService`].
pub trait CatalogEntry:
    Clone + Serialize + Send + Sync + std::fmt::Debug + 'static
{
    /// Human name used in error messages.
    const KIND: &'static str;
    /// Sub-directory of the upload root holding this kind's images.
    const DIRECTORY: &'static str;
    /// Accepted image extensions.
    const EXTENSIONS: &'static [&'static str];
    /// Whether creation must come with an image.
    const IMAGE_REQUIRED: bool;

    type Draft: DeserializeOwned + Validate + Send + 'static;
    type Patch: DeserializeOwned + Validate + Send + 'static;

    fn create(id: Uuid, draft: Self::Draft, image: Option<String>) -> Self;

    fn id(&self) -> Uuid;

    fn image(&self) -> Option<&str>;

    /// Replace the image reference, returning the previous one.
    fn set_image(&mut self, image: String) -> Option<String>;

    /// Overwrite the fields present in `patch`.
    fn apply(&mut self, patch: Self::Patch);

    /// `(field, value)` pairs that must be unique across records.
    fn unique_keys(&self) -> Vec<(&'static str, String)>;
}

/// CRUD over one catalog kind, keeping stored images in step with records.
pub struct CatalogService<E: CatalogEntry> {
    repo: Arc<dyn CatalogRepository<E>>,
    uploads: UploadPolicy,
}

impl<E: CatalogEntry> Clone for CatalogService<E> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            uploads: self.uploads.clone(),
        }
    }
}

impl<E: CatalogEntry> CatalogService<E> {
    /// Create a new [`CatalogService`].
    pub fn new(repo: Arc<dyn CatalogRepository<E>>, uploads: UploadPolicy) -> Self {
        Self { repo, uploads }
    }

    /// Every record, in insertion order.
    pub async fn list(&self) -> Result<Vec<E>> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &Uuid) -> Result<E> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::not_found(E::KIND))
    }

    /// Store the image, then insert the record. A rejected insert removes
    /// the image again.
    pub async fn create(
        &self,
        draft: E::Draft,
        file: Option<UploadedFile>,
    ) -> Result<E> {
        let image = match file {
            Some(file) => Some(self.uploads.store(&file).await?),
            None if E::IMAGE_REQUIRED => {
                return Err(ServerError::UploadRejected(format!(
                    "an image is required to create an {}",
                    E::KIND
                )));
            },
            None => None,
        };

        let entry = E::create(Uuid::new_v4(), draft, image.clone());

        if let Err(err) = self.repo.insert(&entry).await {
            if let Some(image) = image {
                self.uploads.discard(&image).await;
            }
            return Err(err);
        }

        tracing::info!(kind = E::KIND, id = %entry.id(), "catalog entry created");
        Ok(entry)
    }

    /// Merge `patch` into the record and swap its image when a new one is
    /// supplied. The old image is removed only once the record is saved.
    pub async fn update(
        &self,
        id: &Uuid,
        patch: E::Patch,
        file: Option<UploadedFile>,
    ) -> Result<E> {
        let mut entry = self.get(id).await?;

        let image = match file {
            Some(file) => Some(self.uploads.store(&file).await?),
            None => None,
        };

        entry.apply(patch);
        let previous = image.clone().and_then(|image| entry.set_image(image));

        if let Err(err) = self.repo.update(&entry).await {
            if let Some(image) = image {
                self.uploads.discard(&image).await;
            }
            return Err(err);
        }

        if let Some(previous) = previous {
            self.uploads.discard(&previous).await;
        }

        Ok(entry)
    }

    /// Remove the record and, best effort, its image.
    pub async fn delete(&self, id: &Uuid) -> Result<()> {
        let entry = self
            .repo
            .delete(id)
            .await?
            .ok_or_else(|| ServerError::not_found(E::KIND))?;

        if let Some(image) = entry.image() {
            self.uploads.discard(image).await;
        }

        tracing::info!(kind = E::KIND, %id, "catalog entry deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryCatalog;

    fn jpeg(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_owned(),
            content_type: Some("image/jpeg".to_owned()),
            bytes: vec![0xFF, 0xD8, 0xFF].into(),
        }
    }

    fn service<E: CatalogEntry>(
        dir: &tempfile::TempDir,
    ) -> CatalogService<E> {
        CatalogService::new(
            Arc::new(MemoryCatalog::<E>::default()),
            UploadPolicy::images(dir.path().join(E::DIRECTORY), E::EXTENSIONS),
        )
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    fn lima() -> NewDestination {
        NewDestination {
            name: "Lima".into(),
            iata_code: "LIM".into(),
            airport: "Jorge Chávez".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_destination_is_conflict_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = service::<Destination>(&dir);
        let images = dir.path().join(Destination::DIRECTORY);

        destinations
            .create(lima(), Some(jpeg("lim.jpg")))
            .await
            .unwrap();
        let err = destinations
            .create(lima(), Some(jpeg("lim.jpg")))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::Conflict(_)));
        let all = destinations.list().await.unwrap();
        assert_eq!(all.iter().filter(|d| d.name == "Lima").count(), 1);
        assert_eq!(files_in(&images), 1);
    }

    #[tokio::test]
    async fn test_same_iata_code_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = service::<Destination>(&dir);

        destinations.create(lima(), None).await.unwrap();
        let err = destinations
            .create(
                NewDestination {
                    name: "Callao".into(),
                    iata_code: "lim".into(),
                    airport: "Jorge Chávez".into(),
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_airline_requires_image() {
        let dir = tempfile::tempdir().unwrap();
        let airlines = service::<Airline>(&dir);

        let err = airlines
            .create(NewAirline { name: "LATAM".into() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::UploadRejected(_)));

        let err = airlines
            .create(
                NewAirline { name: "LATAM".into() },
                Some(UploadedFile {
                    file_name: "logo.webp".into(),
                    content_type: Some("image/webp".into()),
                    bytes: vec![1, 2, 3].into(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::UploadRejected(_)));
        assert!(airlines.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_swaps_image() {
        let dir = tempfile::tempdir().unwrap();
        let airlines = service::<Airline>(&dir);
        let images = dir.path().join(Airline::DIRECTORY);

        let created = airlines
            .create(NewAirline { name: "LATAM".into() }, Some(jpeg("a.jpg")))
            .await
            .unwrap();
        let updated = airlines
            .update(&created.id, AirlinePatch::default(), Some(jpeg("b.jpg")))
            .await
            .unwrap();

        assert_ne!(updated.image, created.image);
        assert_eq!(updated.name, "LATAM");
        assert!(!images.join(&created.image).exists());
        assert!(images.join(&updated.image).exists());
    }

    #[tokio::test]
    async fn test_update_without_image_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let airlines = service::<Airline>(&dir);

        let created = airlines
            .create(NewAirline { name: "LATAM".into() }, Some(jpeg("a.jpg")))
            .await
            .unwrap();
        let updated = airlines
            .update(
                &created.id,
                AirlinePatch {
                    name: Some("LATAM Perú".into()),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "LATAM Perú");
        assert_eq!(updated.image, created.image);
    }

    #[tokio::test]
    async fn test_conflicting_update_discards_new_image() {
        let dir = tempfile::tempdir().unwrap();
        let airlines = service::<Airline>(&dir);
        let images = dir.path().join(Airline::DIRECTORY);

        airlines
            .create(NewAirline { name: "Avianca".into() }, Some(jpeg("a.jpg")))
            .await
            .unwrap();
        let sky = airlines
            .create(NewAirline { name: "Sky".into() }, Some(jpeg("s.jpg")))
            .await
            .unwrap();

        let err = airlines
            .update(
                &sky.id,
                AirlinePatch {
                    name: Some("Avianca".into()),
                },
                Some(jpeg("new.jpg")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::Conflict(_)));
        assert_eq!(files_in(&images), 2);
        assert!(images.join(&sky.image).exists());
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = service::<Destination>(&dir);
        let id = Uuid::new_v4();

        assert!(matches!(
            destinations
                .update(&id, DestinationPatch::default(), None)
                .await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            destinations.delete(&id).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_image() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = service::<Destination>(&dir);
        let images = dir.path().join(Destination::DIRECTORY);

        let lima = destinations
            .create(lima(), Some(jpeg("lim.jpg")))
            .await
            .unwrap();
        destinations.delete(&lima.id).await.unwrap();

        assert!(destinations.list().await.unwrap().is_empty());
        assert_eq!(files_in(&images), 0);
    }
}
