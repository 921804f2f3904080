//! Certificate image storage on the S3-compatible bucket of the hosted backend.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use axum::extract::multipart::Field;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    /// An object already sits at the path. Callers treat this as success.
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Upload failed: {0}")]
    Upload(String),
}

/// An image received from the client, already checked by [`validate_image`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Uploads without overwriting an existing object.
    async fn upload(&self, path: &str, image: &ImageUpload) -> Result<(), StorageError>;

    fn public_url(&self, path: &str) -> String;
}

/// Enforces the `image/*` MIME type and the 10 MB size limit.
pub fn validate_image(content_type: &str, len: usize) -> Result<(), String> {
    if !content_type.starts_with("image/") {
        return Err("File must be an image (JPG, PNG, ...)".to_string());
    }
    if len > MAX_IMAGE_BYTES {
        return Err("Image must be 10MB or smaller".to_string());
    }
    Ok(())
}

/// `{user_id}/{timestamp_millis}_{file_name}`; the timestamp keeps repeated
/// submissions of the same file name apart.
pub fn object_path(user_id: Uuid, timestamp_millis: i64, file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let base = if base.is_empty() { "upload" } else { base };
    format!("{user_id}/{timestamp_millis}_{base}")
}

/// Reads a multipart field into an [`ImageUpload`], rejecting non-images and
/// oversized files.
pub async fn read_image_field(field: Field<'_>) -> Result<ImageUpload, AppError> {
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Could not read uploaded file: {e}")))?;
    validate_image(&content_type, bytes.len()).map_err(AppError::Validation)?;
    Ok(ImageUpload {
        file_name,
        content_type,
        bytes,
    })
}

#[derive(Clone)]
pub struct S3FileStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl S3FileStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base: &str) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    async fn upload(&self, path: &str, image: &ImageUpload) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(image.bytes.clone()))
            .content_type(&image.content_type)
            .cache_control("max-age=3600")
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| match e.raw_response().map(|r| r.status().as_u16()) {
                Some(409) | Some(412) => StorageError::AlreadyExists(path.to_string()),
                _ => StorageError::Upload(e.to_string()),
            })?;

        info!("Uploaded s3://{}/{}", self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, path)
    }
}
