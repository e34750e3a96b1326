use crate::config::StorageConfig;
use crate::error::app_error::AppError;
use crate::models::dashboard::BatchImage;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use rocket::fairing::AdHoc;
use std::sync::Arc;
use std::time::Duration;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the object and returns its externally addressable URL.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, AppError>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, AppError>;
    async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError>;
    fn bucket(&self) -> &str;
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    config: StorageConfig,
}

impl S3Storage {
    pub async fn from_config(config: StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            config,
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("Failed to upload {}: {}", key, DisplayErrorContext(&e))))?;

        Ok(self.config.object_url(key))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, AppError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| AppError::storage(format!("Failed to list {}: {}", prefix, DisplayErrorContext(&e))))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(StoredObject {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                    last_modified: object.last_modified().and_then(|at| DateTime::from_timestamp(at.secs(), at.subsec_nanos())),
                });
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(expires_in).map_err(|e| AppError::storage(format!("Invalid presign duration: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::storage(format!("Failed to presign {}: {}", key, DisplayErrorContext(&e))))?;

        Ok(request.uri().to_string())
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }
}

/// `(file name, identifier, extension)` of an image object key; `None` for folders and
/// non-image files.
pub fn image_key_parts(key: &str) -> Option<(String, String, String)> {
    if key.ends_with('/') {
        return None;
    }

    let name = key.rsplit('/').next()?.to_string();
    let (identifier, extension) = name.rsplit_once('.')?;
    let extension = extension.to_lowercase();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }

    Some((name.clone(), identifier.to_string(), extension))
}

/// Images under `prefix`, newest first, each with a time-limited download link.
pub async fn list_batch_images(storage: &dyn ObjectStorage, prefix: &str, link_ttl: Duration) -> Result<Vec<BatchImage>, AppError> {
    let mut objects = storage.list_objects(prefix).await?;
    objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    let mut images = Vec::with_capacity(objects.len());
    for object in objects {
        let Some((name, identifier, file_type)) = image_key_parts(&object.key) else {
            continue;
        };
        let url = storage.presigned_url(&object.key, link_ttl).await?;

        images.push(BatchImage {
            key: object.key,
            url,
            name,
            identifier,
            size: object.size,
            last_modified: object.last_modified,
            file_type,
        });
    }

    Ok(images)
}

pub fn stage_storage(config: StorageConfig) -> AdHoc {
    AdHoc::on_ignite("Object storage (S3)", |rocket| async move {
        let bucket = config.bucket.clone();
        let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::from_config(config).await);
        tracing::info!(bucket = %bucket, "object storage client initialized");
        rocket.manage(storage)
    })
}
