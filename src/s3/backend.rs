//! The storage operations a multipart copy is built from.
//!
//! [MultipartBackend] is implemented for [aws_sdk_s3::Client] and, for tests,
//! by [InMemoryBackend](super::sandbox::InMemoryBackend). The backend is always
//! passed explicitly to the functions that need it.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::DateTime;
use serde::Serialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use super::{ByteRange, PartNumber, S3Object};

/// A [MultipartBackend] shared between concurrently running part copies.
pub type SharedBackend = Arc<dyn MultipartBackend>;

/// Errors returned by a [MultipartBackend].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Object {0} does not exist")]
    NotFound(S3Object),
    #[error("Multipart upload {upload_id} does not exist for {object}")]
    NoSuchUpload { object: S3Object, upload_id: String },
    #[error("Response was missing {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Service(Box<dyn StdError + Send + Sync>),
}

impl<E: StdError + Send + Sync + 'static> From<SdkError<E>> for BackendError {
    fn from(value: SdkError<E>) -> Self {
        Self::Service(Box::new(value))
    }
}

/// Metadata about an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub content_length: u64,
    pub e_tag: Option<String>,
}

/// One `UploadPartCopy` request: copy `byte_range` of `source` into part
/// `part_number` of the upload `upload_id` on `destination`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct UploadPartCopyRequest<'a> {
    pub source: &'a S3Object,
    pub destination: &'a S3Object,
    pub upload_id: &'a str,
    pub part_number: PartNumber,
    pub byte_range: ByteRange,
}

/// The result of a successful `UploadPartCopy`.
#[derive(Debug, Clone, PartialEq)]
pub struct CopiedPart {
    pub e_tag: String,
    pub last_modified: Option<DateTime>,
}

/// A part already present on an upload, as reported by `ListParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: PartNumber,
    pub e_tag: String,
    pub size: u64,
}

/// A `(part_number, etag)` pair as passed to `CompleteMultipartUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPartInfo {
    pub part_number: PartNumber,
    pub e_tag: String,
}

/// Metadata about a newly written destination object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionInfo {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub location: Option<String>,
}

impl CompletionInfo {
    pub(crate) fn new(object: &S3Object, e_tag: Option<String>, location: Option<String>) -> Self {
        CompletionInfo {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
            e_tag,
            location,
        }
    }
}

/// The object storage operations used to copy objects.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Describe an object. Returns [BackendError::NotFound] if it does not exist.
    async fn head_object(&self, object: &S3Object) -> Result<ObjectInfo, BackendError>;

    /// Start a multipart upload to `object`, returning its upload id.
    async fn create_multipart_upload(&self, object: &S3Object) -> Result<String, BackendError>;

    /// Copy a byte range of an existing object into one part of an upload.
    async fn upload_part_copy(
        &self,
        request: &UploadPartCopyRequest<'_>,
    ) -> Result<CopiedPart, BackendError>;

    /// List every part uploaded so far, in ascending part number order.
    async fn list_parts(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, BackendError>;

    /// Assemble the parts into the final object. `parts` must be in strictly
    /// ascending part number order.
    async fn complete_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<CompletionInfo, BackendError>;

    /// Discard an upload and every part copied into it.
    async fn abort_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<(), BackendError>;

    /// Copy a whole object in a single request.
    async fn copy_object(
        &self,
        source: &S3Object,
        destination: &S3Object,
    ) -> Result<CompletionInfo, BackendError>;
}
