//! Copying a single byte range into a single part.

use std::time::Duration;

use aws_sdk_s3::primitives::DateTime;
use thiserror::Error;
use tracing::instrument;
use typed_builder::TypedBuilder;

use super::backend::{BackendError, CompletedPartInfo, MultipartBackend, UploadPartCopyRequest};
use super::{ByteRange, PartNumber, S3Object};

/// Everything needed to copy parts of `source` into an open multipart upload
/// on `destination`. Built once per copy and never modified.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct CopySpec {
    pub destination: S3Object,
    pub source: S3Object,
    #[builder(setter(into))]
    pub upload_id: String,
    /// Size of `source` in bytes.
    pub content_length: u64,
}

/// A part that was copied.
#[derive(Debug, Clone, PartialEq)]
pub struct PartSuccess {
    pub part_number: PartNumber,
    pub e_tag: String,
    pub last_modified: Option<DateTime>,
}

impl From<PartSuccess> for CompletedPartInfo {
    fn from(value: PartSuccess) -> Self {
        CompletedPartInfo {
            part_number: value.part_number,
            e_tag: value.e_tag,
        }
    }
}

/// Why a part was not copied.
#[derive(Debug, Error)]
pub enum PartFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
    /// The task copying the part panicked or was cancelled.
    #[error("Task did not complete: {0}")]
    TaskFault(String),
}

/// A part that was not copied, tagged with its part number so failures can
/// be reported in part order whatever order they happened in.
#[derive(Debug, Error)]
#[error("Part {part_number} ({byte_range}) failed: {reason}")]
pub struct PartError {
    pub part_number: PartNumber,
    pub byte_range: ByteRange,
    #[source]
    pub reason: PartFailure,
}

/// The outcome of copying one part.
pub type PartResult = Result<PartSuccess, PartError>;

/// Copy `byte_range` of the source into part `part_number` of the upload.
///
/// Exactly one request is made; retries are left to the backend. If `timeout`
/// is set and the request takes longer, the part fails with
/// [PartFailure::TimedOut].
#[instrument(skip(backend, spec), fields(upload_id = %spec.upload_id))]
pub async fn copy_part(
    backend: &dyn MultipartBackend,
    spec: &CopySpec,
    part_number: PartNumber,
    byte_range: ByteRange,
    timeout: Option<Duration>,
) -> PartResult {
    let request = UploadPartCopyRequest::builder()
        .source(&spec.source)
        .destination(&spec.destination)
        .upload_id(&spec.upload_id)
        .part_number(part_number)
        .byte_range(byte_range)
        .build();

    let copy = backend.upload_part_copy(&request);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, copy).await {
            Ok(result) => result.map_err(PartFailure::from),
            Err(_) => Err(PartFailure::TimedOut(limit)),
        },
        None => copy.await.map_err(PartFailure::from),
    };

    match outcome {
        Ok(copied) => {
            tracing::debug!(e_tag = %copied.e_tag, "Copied part");
            Ok(PartSuccess {
                part_number,
                e_tag: copied.e_tag,
                last_modified: copied.last_modified,
            })
        }
        Err(reason) => {
            tracing::warn!(error = %reason, "Part copy failed");
            Err(PartError {
                part_number,
                byte_range,
                reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::sandbox::InMemoryBackend;
    use assert_matches::assert_matches;

    const SIZE: u64 = 12 * 1024 * 1024;

    async fn setup() -> (InMemoryBackend, CopySpec) {
        let backend = InMemoryBackend::new();
        let source = S3Object::new("src-bucket", "big.bin");
        let destination = S3Object::new("dst-bucket", "copy.bin");
        backend.put_object(&source, vec![3_u8; SIZE as usize]);
        let upload_id = backend.create_multipart_upload(&destination).await.unwrap();
        let spec = CopySpec::builder()
            .destination(destination)
            .source(source)
            .upload_id(upload_id)
            .content_length(SIZE)
            .build();
        (backend, spec)
    }

    fn part(n: i32) -> PartNumber {
        PartNumber::try_from(n).unwrap()
    }

    #[tokio::test]
    async fn test_success_carries_part_number() {
        let (backend, spec) = setup().await;
        let range = ByteRange::try_from((0, 1023)).unwrap();

        let success = copy_part(&backend, &spec, part(4), range, None).await.unwrap();
        assert_eq!(success.part_number, part(4));
        assert!(success.last_modified.is_some());

        let listed = backend
            .list_parts(&spec.destination, &spec.upload_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].part_number, part(4));
        assert_eq!(listed[0].size, 1024);
        assert_eq!(listed[0].e_tag, success.e_tag);
    }

    #[tokio::test]
    async fn test_failure_carries_part_number() {
        let (backend, spec) = setup().await;
        backend.fail_part(part(2));
        let range = ByteRange::try_from((5, 10)).unwrap();

        let error = copy_part(&backend, &spec, part(2), range, None)
            .await
            .unwrap_err();
        assert_eq!(error.part_number, part(2));
        assert_eq!(error.byte_range, range);
        assert_matches!(error.reason, PartFailure::Backend(BackendError::Service(_)));
    }

    #[tokio::test]
    async fn test_missing_upload() {
        let (backend, mut spec) = setup().await;
        spec.upload_id = "missing".to_owned();
        let range = ByteRange::try_from((0, 10)).unwrap();

        let error = copy_part(&backend, &spec, part(1), range, None)
            .await
            .unwrap_err();
        assert_matches!(
            error.reason,
            PartFailure::Backend(BackendError::NoSuchUpload { .. })
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let (backend, spec) = setup().await;
        backend.delay_part(part(1), Duration::from_secs(5));
        let range = ByteRange::try_from((0, 10)).unwrap();
        let limit = Duration::from_millis(20);

        let error = copy_part(&backend, &spec, part(1), range, Some(limit))
            .await
            .unwrap_err();
        assert_eq!(error.part_number, part(1));
        assert_matches!(error.reason, PartFailure::TimedOut(d) if d == limit);
    }
}
