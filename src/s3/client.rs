//! [MultipartBackend] over the AWS SDK S3 [Client].
//!
//! Retries and timeouts of individual requests are whatever the client was
//! configured with; see [crate::config::load_from_env].

use std::error::Error as StdError;

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tracing::instrument;

use super::backend::{
    BackendError, CompletedPartInfo, CompletionInfo, CopiedPart, MultipartBackend, ObjectInfo,
    UploadPartCopyRequest, UploadedPart,
};
use super::{PartNumber, S3Object};

fn upload_error<E>(err: SdkError<E>, object: &S3Object, upload_id: &str) -> BackendError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    if err.code() == Some("NoSuchUpload") {
        BackendError::NoSuchUpload {
            object: object.clone(),
            upload_id: upload_id.to_owned(),
        }
    } else {
        err.into()
    }
}

fn non_negative(value: i64, field: &'static str) -> Result<u64, BackendError> {
    u64::try_from(value).map_err(|_| BackendError::MissingField(field))
}

#[async_trait]
impl MultipartBackend for Client {
    #[instrument(skip(self))]
    async fn head_object(&self, object: &S3Object) -> Result<ObjectInfo, BackendError> {
        let head_object = self
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_error) if service_error.is_not_found() => {
                    BackendError::NotFound(object.clone())
                }
                _ => BackendError::from(e),
            })?;

        let content_length = head_object
            .content_length()
            .ok_or(BackendError::MissingField("ContentLength"))?;
        Ok(ObjectInfo {
            content_length: non_negative(content_length, "ContentLength")?,
            e_tag: head_object.e_tag().map(str::to_owned),
        })
    }

    #[instrument(skip(self))]
    async fn create_multipart_upload(&self, object: &S3Object) -> Result<String, BackendError> {
        let output = self
            .create_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await?;
        output
            .upload_id()
            .map(str::to_owned)
            .ok_or(BackendError::MissingField("UploadId"))
    }

    #[instrument(skip(self), fields(part_number = %request.part_number, range = %request.byte_range))]
    async fn upload_part_copy(
        &self,
        request: &UploadPartCopyRequest<'_>,
    ) -> Result<CopiedPart, BackendError> {
        let response = self
            .upload_part_copy()
            .bucket(&request.destination.bucket)
            .key(&request.destination.key)
            .upload_id(request.upload_id)
            .part_number(request.part_number.into())
            .copy_source(request.source.copy_source())
            .copy_source_range(request.byte_range.to_string())
            .send()
            .await
            .map_err(|e| upload_error(e, request.destination, request.upload_id))?;

        let result = response
            .copy_part_result
            .ok_or(BackendError::MissingField("CopyPartResult"))?;
        Ok(CopiedPart {
            e_tag: result
                .e_tag
                .ok_or(BackendError::MissingField("CopyPartResult.ETag"))?,
            last_modified: result.last_modified,
        })
    }

    #[instrument(skip(self))]
    async fn list_parts(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, BackendError> {
        let mut pages = self
            .list_parts()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .into_paginator()
            .send();

        let mut parts = vec![];
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| upload_error(e, object, upload_id))?;
            for part in page.parts() {
                let part_number = part
                    .part_number()
                    .ok_or(BackendError::MissingField("Part.PartNumber"))?;
                parts.push(UploadedPart {
                    part_number: PartNumber::try_from(part_number)
                        .map_err(|e| BackendError::Service(Box::new(e)))?,
                    e_tag: part
                        .e_tag()
                        .map(str::to_owned)
                        .ok_or(BackendError::MissingField("Part.ETag"))?,
                    size: non_negative(part.size().unwrap_or_default(), "Part.Size")?,
                });
            }
        }
        parts.sort_by_key(|part| part.part_number);
        Ok(parts)
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<CompletionInfo, BackendError> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .e_tag(&part.e_tag)
                    .part_number(part.part_number.into())
                    .build()
            })
            .collect();
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let output = self
            .complete_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|e| upload_error(e, object, upload_id))?;

        Ok(CompletionInfo::new(
            object,
            output.e_tag().map(str::to_owned),
            output.location().map(str::to_owned),
        ))
    }

    #[instrument(skip(self))]
    async fn abort_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.abort_multipart_upload()
            .bucket(&object.bucket)
            .key(&object.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| upload_error(e, object, upload_id))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_object(
        &self,
        source: &S3Object,
        destination: &S3Object,
    ) -> Result<CompletionInfo, BackendError> {
        let output = self
            .copy_object()
            .copy_source(source.copy_source())
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some("NoSuchKey") {
                    BackendError::NotFound(source.clone())
                } else {
                    BackendError::from(e)
                }
            })?;

        Ok(CompletionInfo::new(
            destination,
            output
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(str::to_owned),
            None,
        ))
    }
}
