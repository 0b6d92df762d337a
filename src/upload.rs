//! Image storage on local disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// How stored files are renamed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Naming {
    /// `<uuid>.<ext>`.
    #[default]
    Uuid,
    /// `<unix millis>.<ext>`.
    Timestamp,
}

/// File part received in a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Lowercased extension of the client-side file name.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Which files are accepted and where they land.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    extensions: Arc<[String]>,
    media_types: Arc<[String]>,
    directory: PathBuf,
    naming: Naming,
}

impl UploadPolicy {
    /// Accept `image/<ext>` files with one of `extensions`, stored under
    /// `directory`.
    pub fn images(directory: impl Into<PathBuf>, extensions: &[&str]) -> Self {
        let media_types = extensions
            .iter()
            .map(|ext| format!("image/{ext}"))
            .collect::<Vec<_>>();

        Self {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            media_types: media_types.into(),
            directory: directory.into(),
            naming: Naming::default(),
        }
    }

    pub fn naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    /// Both the extension and the declared media type must be allowed.
    pub fn check(&self, file: &UploadedFile) -> Result<String> {
        let extension = file
            .extension()
            .filter(|ext| self.extensions.iter().any(|e| e == ext));
        let media_type = file
            .content_type
            .as_deref()
            .map(str::to_ascii_lowercase)
            .filter(|media| self.media_types.iter().any(|m| m == media));

        match (extension, media_type) {
            (Some(extension), Some(_)) => Ok(extension),
            _ => Err(ServerError::UploadRejected(format!(
                "only {} images are accepted",
                self.extensions.join(", ")
            ))),
        }
    }

    fn file_name(&self, extension: &str) -> String {
        match self.naming {
            Naming::Uuid => format!("{}.{extension}", uuid::Uuid::new_v4()),
            Naming::Timestamp => format!(
                "{}.{extension}",
                chrono::Utc::now().timestamp_millis()
            ),
        }
    }

    /// Check then write `file`, returning its stored name.
    pub async fn store(&self, file: &UploadedFile) -> Result<String> {
        let extension = self.check(file)?;
        let name = self.file_name(&extension);

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|err| ServerError::internal("cannot create upload directory", err))?;
        tokio::fs::write(self.directory.join(&name), &file.bytes)
            .await
            .map_err(|err| ServerError::internal("cannot write upload", err))?;

        tracing::debug!(file = %name, size = file.bytes.len(), "image stored");
        Ok(name)
    }

    /// Remove a stored file. Never fails; a missing file is fine.
    pub async fn discard(&self, name: &str) {
        // Stored names are flat, refuse anything that walks the tree.
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return;
        }

        match tokio::fs::remove_file(self.directory.join(name)).await {
            Ok(()) => tracing::debug!(file = %name, "image removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "cannot remove image")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, media: Option<&str>) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: media.map(Into::into),
            bytes: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn test_check() {
        let policy = UploadPolicy::images("/tmp", &["jpeg", "jpg", "png"]);

        assert_eq!(
            policy.check(&file("logo.PNG", Some("image/png"))).unwrap(),
            "png"
        );
        assert!(policy.check(&file("logo.png", None)).is_err());
        assert!(policy.check(&file("logo.png", Some("text/plain"))).is_err());
        assert!(policy.check(&file("logo.gif", Some("image/png"))).is_err());
        assert!(policy.check(&file("logo", Some("image/png"))).is_err());
    }

    #[tokio::test]
    async fn test_store_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("destinos");
        let policy = UploadPolicy::images(&root, &["webp"]);

        let name = policy
            .store(&file("cusco.webp", Some("image/webp")))
            .await
            .unwrap();
        assert!(name.ends_with(".webp"));
        assert_ne!(name, "cusco.webp");
        assert!(root.join(&name).exists());

        policy.discard(&name).await;
        assert!(!root.join(&name).exists());

        // already gone.
        policy.discard(&name).await;
    }

    #[tokio::test]
    async fn test_timestamp_naming() {
        let dir = tempfile::tempdir().unwrap();
        let policy = UploadPolicy::images(dir.path(), &["png"])
            .naming(Naming::Timestamp);

        let name = policy
            .store(&file("a.png", Some("image/png")))
            .await
            .unwrap();
        let stem = name.trim_end_matches(".png");
        assert!(stem.parse::<i64>().is_ok());
        assert!(dir.path().join(&name).exists());
    }
}
