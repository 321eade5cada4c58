//! Local blob storage for uploaded files.
//!
//! Blobs live under `<root>/<area>/<name>` and are published read-only at
//! `/uploads/<area>/<name>`.

use crate::errors::ServiceError;
use chrono::Utc;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upload area for project documents.
pub const PROJECT_AREA: &str = "projects";
/// Upload area for engineer profile pictures.
pub const ENGINEER_AREA: &str = "engineers";

/// Extensions accepted for project documents and drawings.
pub const PROJECT_FILE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "jpg", "jpeg", "png", "xlsx", "xls", "dwg", "dxf", "skp", "obj", "fbx",
    "3ds", "stl", "rvt", "ifc",
];

/// Extensions accepted for profile images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif"];

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Lower-cased extension of an uploaded file name, without the dot.
pub fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Checks `original_name` against an extension whitelist and returns the
/// normalized extension.
pub fn accepted_extension(original_name: &str, allowed: &[&str]) -> Result<String, ServiceError> {
    match extension_of(original_name) {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(ext),
        other => Err(ServiceError::ValidationError(format!(
            "Invalid file type: .{}. Allowed types: {}",
            other.unwrap_or_default(),
            allowed
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// `<prefix>-<millis>-<random>.<ext>`, unique enough for one upload directory.
pub fn generate_file_name(prefix: &str, ext: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}.{}",
        prefix,
        Utc::now().timestamp_millis(),
        suffix,
        ext
    )
}

pub fn public_url(area: &str, name: &str) -> String {
    format!("/uploads/{}/{}", area, name)
}

/// A file received from a multipart form, fully buffered.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn mime_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, area: &str, name: &str) -> Result<PathBuf, ServiceError> {
        // Stored names are generated, but deletes take them from the database.
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ServiceError::StorageError(format!(
                "refusing to touch blob name {:?}",
                name
            )));
        }
        Ok(self.root.join(area).join(name))
    }

    /// Writes a blob, creating the area directory on first use.
    pub async fn save(&self, area: &str, name: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        let path = self.path_for(area, name)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ServiceError::StorageError(format!("create {}: {}", dir.display(), e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), size = bytes.len(), "blob stored");
        Ok(path)
    }

    /// Removes a blob. A blob that is already gone is not an error; any other
    /// failure is logged and swallowed since the owning row is already deleted.
    pub async fn remove(&self, area: &str, name: &str) {
        let path = match self.path_for(area, name) {
            Ok(path) => path,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "blob removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "blob already gone")
            }
            Err(e) => warn!(path = %path.display(), "failed to remove blob: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn generated_names_follow_the_pattern() {
        let name = generate_file_name("file", "pdf");
        let pattern = Regex::new(r"^file-\d{13}-\d{1,9}\.pdf$").unwrap();
        assert!(pattern.is_match(&name), "{}", name);
    }

    #[test]
    fn extension_whitelist() {
        assert_eq!(
            accepted_extension("Site Plan.DWG", PROJECT_FILE_EXTENSIONS).unwrap(),
            "dwg"
        );
        assert!(accepted_extension("payload.exe", PROJECT_FILE_EXTENSIONS).is_err());
        assert!(accepted_extension("README", PROJECT_FILE_EXTENSIONS).is_err());
        assert!(accepted_extension("face.gif", IMAGE_EXTENSIONS).is_ok());
        assert!(accepted_extension("face.pdf", IMAGE_EXTENSIONS).is_err());
    }

    #[tokio::test]
    async fn save_then_remove_tolerates_missing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        let path = storage.save(PROJECT_AREA, "file-1-2.pdf", b"%PDF").await.unwrap();
        assert!(path.exists());

        storage.remove(PROJECT_AREA, "file-1-2.pdf").await;
        assert!(!path.exists());
        storage.remove(PROJECT_AREA, "file-1-2.pdf").await;
    }

    #[tokio::test]
    async fn traversal_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.save(PROJECT_AREA, "../escape.pdf", b"x").await.is_err());
        assert_eq!(public_url(PROJECT_AREA, "a.pdf"), "/uploads/projects/a.pdf");
    }
}
