// libs/appointment-cell/src/services/storage.rs
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::AppointmentError;

/// Read access to the container NBSS drops extract files into. Blob names
/// are `/`-separated paths, e.g. `2025-07-01/ABC_20250701091221_APPT_106.dat`.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Names of the blobs in the `prefix` directory, sorted.
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<String>, AppointmentError>;

    async fn download(&self, name: &str) -> Result<String, AppointmentError>;
}

/// Builds the storage backend from configuration: a local directory when
/// `BLOB_STORAGE_PATH` is set, otherwise the Supabase Storage bucket named by
/// `BLOB_CONTAINER_NAME`.
pub fn blob_storage_from_config(config: &AppConfig) -> Result<Box<dyn BlobStorage>, AppointmentError> {
    if !config.is_blob_storage_configured() {
        return Err(AppointmentError::StorageNotConfigured(
            "set BLOB_CONTAINER_NAME or BLOB_STORAGE_PATH".to_string(),
        ));
    }
    match &config.blob_storage_path {
        Some(path) => Ok(Box::new(LocalBlobStorage::new(path))),
        None => Ok(Box::new(SupabaseBlobStorage::new(config))),
    }
}

// ==============================================================================
// SUPABASE STORAGE
// ==============================================================================

#[derive(Debug, Deserialize)]
struct StorageObject {
    name: String,
    /// Folders are listed without an id.
    id: Option<String>,
}

pub struct SupabaseBlobStorage {
    supabase: SupabaseClient,
    bucket: String,
}

impl SupabaseBlobStorage {
    const LIST_LIMIT: usize = 1000;

    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            bucket: config.blob_container_name.clone(),
        }
    }
}

#[async_trait]
impl BlobStorage for SupabaseBlobStorage {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<String>, AppointmentError> {
        let prefix = prefix.trim_end_matches('/');
        let path = format!("/storage/v1/object/list/{}", urlencoding::encode(&self.bucket));
        let body = json!({
            "prefix": prefix,
            "limit": Self::LIST_LIMIT,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" }
        });

        let objects: Vec<StorageObject> = self
            .supabase
            .request(Method::POST, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::StorageError(format!("Failed to list {}: {}", prefix, e)))?;

        let mut names: Vec<String> = objects
            .into_iter()
            .filter(|o| o.id.is_some())
            .map(|o| format!("{}/{}", prefix, o.name))
            .collect();
        names.sort();

        debug!("Found {} blobs under {}/{}", names.len(), self.bucket, prefix);
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<String, AppointmentError> {
        let encoded: Vec<String> = name.split('/').map(|s| urlencoding::encode(s).into_owned()).collect();
        let path = format!(
            "/storage/v1/object/{}/{}",
            urlencoding::encode(&self.bucket),
            encoded.join("/")
        );

        self.supabase
            .request_text(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::StorageError(format!("Failed to download {}: {}", name, e)))
    }
}

// ==============================================================================
// LOCAL DIRECTORY
// ==============================================================================

/// Extract files under a local directory, for local runs.
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<String>, AppointmentError> {
        let prefix = prefix.trim_end_matches('/');
        let dir = self.root.join(prefix);
        if !dir.is_dir() {
            debug!("No directory {}", dir.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| AppointmentError::StorageError(format!("Failed to list {}: {}", dir.display(), e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppointmentError::StorageError(format!("Failed to list {}: {}", dir.display(), e)))?
        {
            if entry.path().is_file() {
                names.push(format!("{}/{}", prefix, entry.file_name().to_string_lossy()));
            }
        }
        names.sort();
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<String, AppointmentError> {
        let path = self.root.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppointmentError::StorageError(format!("Failed to read {}: {}", path.display(), e)))
    }
}
