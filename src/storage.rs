use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use opendal::{Operator, services};
use std::time::Duration;
use uuid::Uuid;

/// Lifetime of the signed read URLs handed out for stored videos.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

const DEFAULT_EXTENSION: &str = "mp4";
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Backend(#[from] opendal::Error),

    #[error("invalid service account credentials: {0}")]
    Credentials(String),
}

/// Durable object storage for uploaded videos.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `data` under `key`.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Returns a URL granting read access to `key` for `ttl`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// A video written to a [`BlobStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredVideo {
    pub key: String,
    pub content_type: &'static str,
    pub url: String,
}

/// Returns the extension of `filename`, or `mp4` when it has none or it is
/// not plain ASCII alphanumerics.
pub fn file_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            ext
        }
        _ => DEFAULT_EXTENSION,
    }
}

/// Maps a file extension to its video MIME type, `video/mp4` when unknown.
pub fn content_type_for(extension: &str) -> &'static str {
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Storage key for an upload: `videos/<YYYYMMDD>/<id>.<ext>`.
pub fn storage_key(date: NaiveDate, id: Uuid, extension: &str) -> String {
    format!("videos/{}/{}.{}", date.format("%Y%m%d"), id, extension)
}

/// Stores an uploaded video under a fresh date-partitioned key and signs a
/// read URL for it.
pub async fn upload_video(
    store: &dyn BlobStore,
    data: Vec<u8>,
    filename: &str,
) -> Result<StoredVideo, StorageError> {
    let extension = file_extension(filename);
    let content_type = content_type_for(extension);
    let key = storage_key(chrono::Local::now().date_naive(), Uuid::new_v4(), extension);

    log::debug!("Writing {} bytes to {} as {}", data.len(), key, content_type);
    store.put(&key, data, content_type).await?;
    let url = store.signed_url(&key, SIGNED_URL_TTL).await?;

    Ok(StoredVideo {
        key,
        content_type,
        url,
    })
}

/// [`BlobStore`] backed by an opendal operator.
#[derive(Clone, Debug)]
pub struct OperatorBlobStore {
    op: Operator,
}

impl OperatorBlobStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Connects to a Google Cloud Storage bucket.
    ///
    /// Without explicit service account credentials the ambient ones are
    /// used (`GOOGLE_APPLICATION_CREDENTIALS`, metadata server).
    pub fn gcs(bucket: &str, credentials_json: Option<&str>) -> Result<Self, StorageError> {
        log::info!("Configuring GCS storage with bucket: {}", bucket);

        let mut builder = services::Gcs::default().bucket(bucket).root("/");

        if let Some(credentials) = credentials_json {
            serde_json::from_str::<serde_json::Value>(credentials)
                .map_err(|e| StorageError::Credentials(e.to_string()))?;
            builder = builder.credential(&STANDARD.encode(credentials));
            log::debug!("GCS service account credentials configured");
        }

        let op = Operator::new(builder)?.finish();
        Ok(Self::new(op))
    }
}

#[async_trait]
impl BlobStore for OperatorBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.op.write_with(key, data).content_type(content_type).await?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let presigned = self.op.presign_read(key, ttl).await?;
        Ok(presigned.uri().to_string())
    }
}
