//! Server-side copy of large objects with a multipart upload.
//!
//! A copy is planned with [partition], each planned part is copied by its own
//! task with [copy_part], and the results are collected once every task has
//! finished. S3 requires parts to be listed in ascending order when an upload
//! is completed, so results are put back into part order however the tasks
//! happened to finish.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{instrument, Instrument};
use typed_builder::TypedBuilder;

use super::backend::{
    BackendError, CompletedPartInfo, CompletionInfo, MultipartBackend, SharedBackend,
};
use super::part_copy::{copy_part, CopySpec, PartError, PartFailure};
use super::{
    partition, ByteRange, ByteRanges, CopyOptions, Direction, PartNumber, PartitionError,
    S3Object, MIN_MULTIPART_SIZE,
};

/// The result of copying every planned part.
///
/// `Ok` holds one entry per part, ready to be passed to
/// `CompleteMultipartUpload`. `Err` holds one entry per failed part; the
/// successful parts are dropped since the upload can't be completed without
/// the missing ones. Both are in ascending part number order.
pub type AggregateOutcome = Result<Vec<CompletedPartInfo>, Vec<PartError>>;

/// Errors from a multipart copy. Each carries the objects involved, and the
/// upload id once one exists, so a caller can clean up by hand.
#[derive(Debug, Error)]
pub enum MultipartCopyError {
    #[error("Cannot copy {object} with a multipart upload")]
    Partition {
        object: S3Object,
        source: PartitionError,
    },
    #[error("Failed to describe {object}")]
    Describe {
        object: S3Object,
        source: BackendError,
    },
    #[error("Failed to create a multipart upload for {object}")]
    CreateUpload {
        object: S3Object,
        source: BackendError,
    },
    #[error("Failed to list the parts of upload {upload_id} for {object}")]
    ListParts {
        object: S3Object,
        upload_id: String,
        source: BackendError,
    },
    #[error(
        "{} part(s) failed copying into upload {upload_id} for {destination} (aborted: {aborted})",
        .errors.len()
    )]
    PartsFailed {
        destination: S3Object,
        upload_id: String,
        errors: Vec<PartError>,
        aborted: bool,
    },
    #[error("Failed to complete upload {upload_id} for {object}")]
    Complete {
        object: S3Object,
        upload_id: String,
        source: BackendError,
    },
    #[error("Failed to copy {from} to {to}")]
    Copy {
        from: S3Object,
        to: S3Object,
        source: BackendError,
    },
}

fn plan(
    content_length: u64,
    object: &S3Object,
    options: &CopyOptions,
) -> Result<ByteRanges, MultipartCopyError> {
    partition(
        0,
        content_length,
        options.chunk_size.get(),
        Direction::Forward,
    )
    .map_err(|source| MultipartCopyError::Partition {
        object: object.clone(),
        source,
    })
}

async fn describe(
    backend: &dyn MultipartBackend,
    object: &S3Object,
) -> Result<u64, MultipartCopyError> {
    let info = backend
        .head_object(object)
        .await
        .map_err(|source| MultipartCopyError::Describe {
            object: object.clone(),
            source,
        })?;
    tracing::info!(content_length = info.content_length, "Described source object");
    Ok(info.content_length)
}

/// Copy every `(part_number, byte_range)` pair in `parts`, running at most
/// `options.max_concurrency` copies at once.
///
/// Parts are dispatched in the order given. Every dispatched copy is awaited
/// before returning, failed or not, and a task that panics is reported as a
/// failure of its part.
async fn fan_out(
    backend: SharedBackend,
    spec: Arc<CopySpec>,
    parts: impl Iterator<Item = (PartNumber, ByteRange)>,
    options: &CopyOptions,
) -> AggregateOutcome {
    let permits = Arc::new(Semaphore::new(options.max_concurrency.get()));
    let mut failures = vec![];
    let mut dispatched = vec![];

    for (part_number, byte_range) in parts {
        // `permits` is local and never closed, so this branch does not run.
        // If it did, the part would still be reported rather than dropped.
        let Ok(permit) = permits.clone().acquire_owned().await else {
            failures.push(PartError {
                part_number,
                byte_range,
                reason: PartFailure::TaskFault("concurrency limiter was closed".to_owned()),
            });
            continue;
        };
        tracing::debug!(%part_number, %byte_range, "Dispatching part copy");

        let backend = backend.clone();
        let spec = spec.clone();
        let timeout = options.part_timeout;
        let task = tokio::spawn(
            async move {
                let _permit = permit;
                copy_part(&*backend, &spec, part_number, byte_range, timeout).await
            }
            .in_current_span(),
        );
        dispatched.push(((part_number, byte_range), task));
    }

    let (parts, tasks): (Vec<_>, Vec<_>) = dispatched.into_iter().unzip();
    let mut successes = Vec::with_capacity(parts.len());
    for ((part_number, byte_range), joined) in parts.into_iter().zip(join_all(tasks).await) {
        let result = joined.unwrap_or_else(|join_error| {
            tracing::warn!(%part_number, error = %join_error, "Part copy task did not complete");
            Err(PartError {
                part_number,
                byte_range,
                reason: PartFailure::TaskFault(join_error.to_string()),
            })
        });
        match result {
            Ok(success) => successes.push(CompletedPartInfo::from(success)),
            Err(error) => failures.push(error),
        }
    }

    if failures.is_empty() {
        successes.sort_by_key(|part| part.part_number);
        Ok(successes)
    } else {
        failures.sort_by_key(|error| error.part_number);
        Err(failures)
    }
}

/// Copy every part of `spec.source` into the existing upload `spec.upload_id`.
///
/// The object is split into `options.chunk_size` parts numbered from 1. This
/// does not complete or abort the upload.
///
/// # Errors
///
/// A [PartitionError] is returned, before any part is copied, if the object
/// can't be split into valid parts. Failures of individual parts are reported
/// in the [AggregateOutcome].
#[instrument(skip_all, fields(source = %spec.source, destination = %spec.destination, upload_id = %spec.upload_id))]
pub async fn copy_parts(
    backend: SharedBackend,
    spec: CopySpec,
    options: &CopyOptions,
) -> Result<AggregateOutcome, PartitionError> {
    let parts = partition(
        0,
        spec.content_length,
        options.chunk_size.get(),
        Direction::Forward,
    )?;
    tracing::info!(
        part_count = parts.part_count(),
        chunk_size = parts.chunk_size(),
        max_concurrency = options.max_concurrency.get(),
        "Copying parts"
    );
    Ok(fan_out(backend, Arc::new(spec), parts.numbered(), options).await)
}

/// Like [copy_parts], but skips parts that are already on the upload.
///
/// A part is skipped when the upload already has a part with the same number
/// and the same size as the planned part. The returned parts include the
/// skipped ones, with the ETags reported by `ListParts`.
#[instrument(skip_all, fields(source = %spec.source, destination = %spec.destination, upload_id = %spec.upload_id))]
pub async fn copy_remaining_parts(
    backend: SharedBackend,
    spec: CopySpec,
    options: &CopyOptions,
) -> Result<AggregateOutcome, MultipartCopyError> {
    let planned = plan(spec.content_length, &spec.source, options)?;
    let uploaded: HashMap<_, _> = backend
        .list_parts(&spec.destination, &spec.upload_id)
        .await
        .map_err(|source| MultipartCopyError::ListParts {
            object: spec.destination.clone(),
            upload_id: spec.upload_id.clone(),
            source,
        })?
        .into_iter()
        .map(|part| (part.part_number, part))
        .collect();

    let mut done = vec![];
    let mut remaining = vec![];
    for (part_number, byte_range) in planned.numbered() {
        match uploaded.get(&part_number) {
            Some(part) if part.size == byte_range.size() => done.push(CompletedPartInfo {
                part_number,
                e_tag: part.e_tag.clone(),
            }),
            _ => remaining.push((part_number, byte_range)),
        }
    }
    tracing::info!(
        already_copied = done.len(),
        remaining = remaining.len(),
        "Resuming upload"
    );

    let outcome = fan_out(backend, Arc::new(spec), remaining.into_iter(), options).await;
    Ok(outcome.map(|copied| {
        done.extend(copied);
        done.sort_by_key(|part| part.part_number);
        done
    }))
}

async fn abort_upload(backend: &dyn MultipartBackend, spec: &CopySpec) -> bool {
    match backend
        .abort_multipart_upload(&spec.destination, &spec.upload_id)
        .await
    {
        Ok(()) => {
            tracing::info!(upload_id = %spec.upload_id, "Aborted multipart upload");
            true
        }
        Err(error) => {
            tracing::error!(
                upload_id = %spec.upload_id,
                error = %error,
                "Failed to abort multipart upload"
            );
            false
        }
    }
}

/// Complete the upload if every part was copied. Otherwise report the failed
/// parts, aborting the upload first if `options.abort_on_failure` is set.
async fn finish(
    backend: &dyn MultipartBackend,
    spec: &CopySpec,
    outcome: AggregateOutcome,
    options: &CopyOptions,
) -> Result<CompletionInfo, MultipartCopyError> {
    match outcome {
        Ok(parts) => {
            tracing::info!(
                upload_id = %spec.upload_id,
                parts = parts.len(),
                "All parts completed"
            );
            let completion = backend
                .complete_multipart_upload(&spec.destination, &spec.upload_id, &parts)
                .await
                .map_err(|source| MultipartCopyError::Complete {
                    object: spec.destination.clone(),
                    upload_id: spec.upload_id.clone(),
                    source,
                })?;
            tracing::info!(e_tag = ?completion.e_tag, "Multipart copy completed");
            Ok(completion)
        }
        Err(errors) => {
            let aborted = if options.abort_on_failure {
                abort_upload(backend, spec).await
            } else {
                tracing::warn!(
                    upload_id = %spec.upload_id,
                    destination = %spec.destination,
                    "Leaving incomplete multipart upload in place"
                );
                false
            };
            Err(MultipartCopyError::PartsFailed {
                destination: spec.destination.clone(),
                upload_id: spec.upload_id.clone(),
                errors,
                aborted,
            })
        }
    }
}

async fn multipart_copy(
    backend: SharedBackend,
    destination: &S3Object,
    source: &S3Object,
    content_length: u64,
    options: &CopyOptions,
) -> Result<CompletionInfo, MultipartCopyError> {
    let parts = plan(content_length, source, options)?;

    let upload_id = backend
        .create_multipart_upload(destination)
        .await
        .map_err(|source| MultipartCopyError::CreateUpload {
            object: destination.clone(),
            source,
        })?;
    tracing::info!(
        upload_id = %upload_id,
        part_count = parts.part_count(),
        "Created multipart upload"
    );

    let spec = Arc::new(
        CopySpec::builder()
            .destination(destination.clone())
            .source(source.clone())
            .upload_id(upload_id)
            .content_length(content_length)
            .build(),
    );
    let outcome = fan_out(backend.clone(), spec.clone(), parts.numbered(), options).await;
    finish(&*backend, &spec, outcome, options).await
}

/// Copy `source` to `destination` with a multipart upload.
///
/// The source is described, an upload is created on the destination, every
/// part is copied and the upload is completed. The first step to fail ends
/// the copy. If any part fails the upload is left in place unless
/// `options.abort_on_failure` is set.
///
/// # Errors
///
/// Objects smaller than [MIN_MULTIPART_SIZE] can't be copied this way and
/// return [MultipartCopyError::Partition] without creating an upload; use
/// [S3MultipartCopier], which falls back to a single `CopyObject` request.
#[instrument(skip(backend, options))]
pub async fn copy_object_multipart(
    backend: SharedBackend,
    destination: &S3Object,
    source: &S3Object,
    options: &CopyOptions,
) -> Result<CompletionInfo, MultipartCopyError> {
    let content_length = describe(&*backend, source).await?;
    multipart_copy(backend, destination, source, content_length, options).await
}

/// Copies an object of any size within or between buckets.
///
/// Objects smaller than [MIN_MULTIPART_SIZE], or no larger than the chunk
/// size, are copied with a single `CopyObject` request. Anything bigger is
/// copied in parts with [copy_object_multipart].
///
/// ```no_run
/// use std::sync::Arc;
/// use cobalt_s3_copy::config::load_from_env;
/// use cobalt_s3_copy::s3::{Client, CopyOptions, S3MultipartCopier, S3Object};
///
/// # tokio_test::block_on(async {
/// let shared_config = load_from_env().await.unwrap();
/// let client = Client::new(&shared_config);
///
/// let copier = S3MultipartCopier::builder()
///     .backend(Arc::new(client))
///     .source(S3Object::new("source-bucket", "source-key"))
///     .destination(S3Object::new("destination-bucket", "destination-key"))
///     .options(CopyOptions::default())
///     .build();
/// let completed = copier.send().await.unwrap();
/// println!("{}", completed.key);
/// # })
/// ```
#[derive(derive_more::Debug, TypedBuilder)]
pub struct S3MultipartCopier {
    #[debug(skip)]
    backend: SharedBackend,
    source: S3Object,
    destination: S3Object,
    #[builder(default)]
    options: CopyOptions,
}

impl S3MultipartCopier {
    #[instrument(skip(self), fields(source = %self.source, destination = %self.destination))]
    pub async fn send(&self) -> Result<CompletionInfo, MultipartCopyError> {
        tracing::info!("Starting copy");
        let content_length = describe(&*self.backend, &self.source).await?;

        if content_length < MIN_MULTIPART_SIZE || content_length <= self.options.chunk_size.get() {
            tracing::info!(
                content_length,
                chunk_size = self.options.chunk_size.get(),
                "Source fits in a single part, using atomic copy"
            );
            self.backend
                .copy_object(&self.source, &self.destination)
                .await
                .map_err(|source| MultipartCopyError::Copy {
                    from: self.source.clone(),
                    to: self.destination.clone(),
                    source,
                })
        } else {
            multipart_copy(
                self.backend.clone(),
                &self.destination,
                &self.source,
                content_length,
                &self.options,
            )
            .await
        }
    }

    /// Finish a multipart copy into an upload created earlier, copying only
    /// the parts that are missing, then complete the upload.
    #[instrument(skip(self), fields(source = %self.source, destination = %self.destination))]
    pub async fn resume(&self, upload_id: &str) -> Result<CompletionInfo, MultipartCopyError> {
        let content_length = describe(&*self.backend, &self.source).await?;
        let spec = CopySpec::builder()
            .destination(self.destination.clone())
            .source(self.source.clone())
            .upload_id(upload_id)
            .content_length(content_length)
            .build();
        let outcome =
            copy_remaining_parts(self.backend.clone(), spec.clone(), &self.options).await?;
        finish(&*self.backend, &spec, outcome, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::sandbox::InMemoryBackend;
    use crate::s3::{BackendError, PartSize};
    use assert_matches::assert_matches;
    use bytesize::MIB;
    use proptest::prelude::any;
    use proptest::{prop_assert, prop_assert_eq};
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use test_strategy::proptest;

    fn part(n: i32) -> PartNumber {
        PartNumber::try_from(n).unwrap()
    }

    fn part_numbers(parts: &[CompletedPartInfo]) -> Vec<u32> {
        parts.iter().map(|part| part.part_number.get()).collect()
    }

    fn error_numbers(errors: &[PartError]) -> Vec<u32> {
        errors.iter().map(|error| error.part_number.get()).collect()
    }

    fn options(chunk_size: u64, concurrency: usize) -> CopyOptions {
        CopyOptions::builder()
            .chunk_size(PartSize::try_from(chunk_size).unwrap())
            .max_concurrency(NonZeroUsize::new(concurrency).unwrap())
            .build()
    }

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        source: S3Object,
        destination: S3Object,
    }

    impl Fixture {
        fn new(size: u64) -> Self {
            let backend = Arc::new(InMemoryBackend::new());
            let source = S3Object::new("source-bucket", "large-object.bin");
            let destination = S3Object::new("destination-bucket", "copied.bin");
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            backend.put_object(&source, data);
            Fixture {
                backend,
                source,
                destination,
            }
        }

        fn shared(&self) -> SharedBackend {
            self.backend.clone()
        }

        async fn spec(&self) -> CopySpec {
            let upload_id = self
                .backend
                .create_multipart_upload(&self.destination)
                .await
                .unwrap();
            let content_length = self.backend.get_object(&self.source).unwrap().len() as u64;
            CopySpec::builder()
                .destination(self.destination.clone())
                .source(self.source.clone())
                .upload_id(upload_id)
                .content_length(content_length)
                .build()
        }

        fn copier(&self, options: CopyOptions) -> S3MultipartCopier {
            S3MultipartCopier::builder()
                .backend(self.shared())
                .source(self.source.clone())
                .destination(self.destination.clone())
                .options(options)
                .build()
        }

        fn assert_copied(&self) {
            assert_eq!(
                self.backend.get_object(&self.destination),
                self.backend.get_object(&self.source)
            );
        }
    }

    #[tokio::test]
    async fn test_one_failed_part_fails_the_copy() {
        let fixture = Fixture::new(15 * MIB);
        fixture.backend.fail_part(part(2));
        let spec = fixture.spec().await;

        let outcome = copy_parts(fixture.shared(), spec, &options(5 * MIB, 3))
            .await
            .unwrap();
        let errors = outcome.unwrap_err();
        assert_eq!(error_numbers(&errors), vec![2]);
        assert_matches!(errors[0].reason, PartFailure::Backend(BackendError::Service(_)));
        assert_eq!(fixture.backend.part_copy_calls(), 3);
    }

    #[tokio::test]
    async fn test_workflow_completes_with_ordered_parts() {
        let fixture = Fixture::new(100 * MIB);

        let completion = copy_object_multipart(
            fixture.shared(),
            &fixture.destination,
            &fixture.source,
            &CopyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(completion.bucket, "destination-bucket");
        assert_eq!(completion.key, "copied.bin");

        let completions = fixture.backend.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].upload_id, "upload-1");
        assert_eq!(part_numbers(&completions[0].parts), vec![1, 2]);
        assert_ne!(completions[0].parts[0].e_tag, completions[0].parts[1].e_tag);
        assert!(fixture.backend.open_uploads().is_empty());
        fixture.assert_copied();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_parts_are_reordered() {
        let fixture = Fixture::new(20 * MIB);
        fixture.backend.delay_part(part(1), Duration::from_millis(80));
        fixture.backend.delay_part(part(2), Duration::from_millis(40));
        let spec = fixture.spec().await;

        let parts = copy_parts(fixture.shared(), spec, &options(5 * MIB, 4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(part_numbers(&parts), vec![1, 2, 3, 4]);
    }

    #[proptest(async = "tokio", cases = 8)]
    async fn test_outcome_is_in_part_order(
        #[strategy(1..=5_usize)] part_count: usize,
        #[strategy(proptest::collection::vec(any::<bool>(), #part_count))] failing: Vec<bool>,
        #[strategy(proptest::collection::vec(0..15_u64, #part_count))] delays: Vec<u64>,
        #[strategy(1..=4_usize)] concurrency: usize,
    ) {
        let fixture = Fixture::new(part_count as u64 * 5 * MIB);
        for (index, (fail, delay)) in failing.iter().zip(&delays).enumerate() {
            let part_number = part(index as i32 + 1);
            fixture
                .backend
                .delay_part(part_number, Duration::from_millis(*delay));
            if *fail {
                fixture.backend.fail_part(part_number);
            }
        }
        let spec = fixture.spec().await;

        let outcome = copy_parts(fixture.shared(), spec, &options(5 * MIB, concurrency))
            .await
            .unwrap();
        let expected_failures: Vec<u32> = failing
            .iter()
            .enumerate()
            .filter(|(_, fail)| **fail)
            .map(|(index, _)| index as u32 + 1)
            .collect();

        match outcome {
            Ok(parts) => {
                prop_assert!(expected_failures.is_empty());
                prop_assert_eq!(part_numbers(&parts), (1..=part_count as u32).collect::<Vec<_>>());
            }
            Err(errors) => {
                prop_assert_eq!(error_numbers(&errors), expected_failures);
            }
        }
        prop_assert_eq!(fixture.backend.part_copy_calls(), part_count);
        prop_assert!(fixture.backend.max_in_flight() <= concurrency);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_task_is_reported_as_part_error() {
        let fixture = Fixture::new(15 * MIB);
        fixture.backend.panic_on_part(part(3));
        let spec = fixture.spec().await;

        let errors = copy_parts(fixture.shared(), spec, &options(5 * MIB, 2))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error_numbers(&errors), vec![3]);
        assert_matches!(errors[0].reason, PartFailure::TaskFault(_));
        assert!(errors[0].to_string().contains("Task did not complete"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let fixture = Fixture::new(30 * MIB);
        for n in 1..=6 {
            fixture.backend.delay_part(part(n), Duration::from_millis(20));
        }
        let spec = fixture.spec().await;

        copy_parts(fixture.shared(), spec, &options(5 * MIB, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fixture.backend.part_copy_calls(), 6);
        assert_eq!(fixture.backend.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_part_timeout() {
        let fixture = Fixture::new(10 * MIB);
        fixture.backend.delay_part(part(2), Duration::from_secs(5));
        let spec = fixture.spec().await;
        let options = CopyOptions::builder()
            .chunk_size(PartSize::try_from(5 * MIB).unwrap())
            .part_timeout(Duration::from_millis(20))
            .build();

        let errors = copy_parts(fixture.shared(), spec, &options)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error_numbers(&errors), vec![2]);
        assert_matches!(errors[0].reason, PartFailure::TimedOut(_));
    }

    #[tokio::test]
    async fn test_copy_parts_rejects_invalid_plan() {
        let fixture = Fixture::new(MIB);
        let spec = fixture.spec().await;

        let result = copy_parts(fixture.shared(), spec, &CopyOptions::default()).await;
        assert_matches!(result, Err(PartitionError::TooSmall(_)));
        assert_eq!(fixture.backend.part_copy_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_parts_leave_upload_open() {
        let fixture = Fixture::new(15 * MIB);
        fixture.backend.fail_part(part(1));

        let error = copy_object_multipart(
            fixture.shared(),
            &fixture.destination,
            &fixture.source,
            &options(5 * MIB, 3),
        )
        .await
        .unwrap_err();
        assert_matches!(
            error,
            MultipartCopyError::PartsFailed { ref upload_id, ref errors, aborted: false, .. }
                if upload_id == "upload-1" && error_numbers(errors) == vec![1]
        );
        assert_eq!(fixture.backend.open_uploads(), vec!["upload-1".to_owned()]);
        assert!(fixture.backend.completions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_parts_abort_upload() {
        let fixture = Fixture::new(15 * MIB);
        fixture.backend.fail_part(part(1));
        fixture.backend.fail_part(part(3));
        let options = CopyOptions::builder()
            .chunk_size(PartSize::try_from(5 * MIB).unwrap())
            .abort_on_failure(true)
            .build();

        let error = copy_object_multipart(
            fixture.shared(),
            &fixture.destination,
            &fixture.source,
            &options,
        )
        .await
        .unwrap_err();
        assert_matches!(
            error,
            MultipartCopyError::PartsFailed { ref errors, aborted: true, .. }
                if error_numbers(errors) == vec![1, 3]
        );
        assert_eq!(fixture.backend.aborted_uploads(), vec!["upload-1".to_owned()]);
        assert!(fixture.backend.open_uploads().is_empty());
        assert!(fixture.backend.completions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_creates_no_upload() {
        let fixture = Fixture::new(15 * MIB);
        let missing = S3Object::new("source-bucket", "missing.bin");

        let error = copy_object_multipart(
            fixture.shared(),
            &fixture.destination,
            &missing,
            &CopyOptions::default(),
        )
        .await
        .unwrap_err();
        assert_matches!(
            error,
            MultipartCopyError::Describe { source: BackendError::NotFound(ref object), .. }
                if object == &missing
        );
        assert!(fixture.backend.created_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_small_source_creates_no_upload() {
        let fixture = Fixture::new(4_000_000);

        let error = copy_object_multipart(
            fixture.shared(),
            &fixture.destination,
            &fixture.source,
            &CopyOptions::default(),
        )
        .await
        .unwrap_err();
        assert_matches!(
            error,
            MultipartCopyError::Partition {
                source: PartitionError::TooSmall(4_000_000),
                ..
            }
        );
        assert!(fixture.backend.created_uploads().is_empty());
        assert_eq!(fixture.backend.part_copy_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_copies_small_objects_atomically() {
        let fixture = Fixture::new(MIB);

        let completion = fixture.copier(CopyOptions::default()).send().await.unwrap();
        assert_eq!(completion.key, "copied.bin");
        assert!(fixture.backend.created_uploads().is_empty());
        fixture.assert_copied();
    }

    #[tokio::test]
    async fn test_send_copies_single_chunk_atomically() {
        let fixture = Fixture::new(6 * MIB);

        fixture.copier(CopyOptions::default()).send().await.unwrap();
        assert!(fixture.backend.created_uploads().is_empty());
        assert_eq!(fixture.backend.part_copy_calls(), 0);
        fixture.assert_copied();
    }

    #[tokio::test]
    async fn test_send_copies_large_objects_in_parts() {
        let fixture = Fixture::new(12 * MIB + 17);

        fixture.copier(options(5 * MIB, 2)).send().await.unwrap();
        let completions = fixture.backend.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(part_numbers(&completions[0].parts), vec![1, 2, 3]);
        fixture.assert_copied();
    }

    #[tokio::test]
    async fn test_resume_completes_upload() {
        let fixture = Fixture::new(15 * MIB);
        let spec = fixture.spec().await;
        let upload_id = spec.upload_id.clone();

        let first = ByteRange::try_from((0, 5 * MIB - 1)).unwrap();
        copy_part(&*fixture.backend, &spec, part(1), first, None)
            .await
            .unwrap();
        assert_eq!(fixture.backend.part_copy_calls(), 1);

        let completion = fixture
            .copier(options(5 * MIB, 2))
            .resume(&upload_id)
            .await
            .unwrap();
        assert_eq!(completion.key, "copied.bin");
        assert_eq!(fixture.backend.part_copy_calls(), 3);

        let completions = fixture.backend.completions();
        assert_eq!(completions[0].upload_id, upload_id);
        assert_eq!(part_numbers(&completions[0].parts), vec![1, 2, 3]);
        fixture.assert_copied();
    }

    #[tokio::test]
    async fn test_resume_recopies_parts_of_the_wrong_size() {
        let fixture = Fixture::new(15 * MIB);
        let spec = fixture.spec().await;

        let short = ByteRange::try_from((0, MIB - 1)).unwrap();
        copy_part(&*fixture.backend, &spec, part(1), short, None)
            .await
            .unwrap();

        let parts = copy_remaining_parts(fixture.shared(), spec, &options(5 * MIB, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(part_numbers(&parts), vec![1, 2, 3]);
        assert_eq!(fixture.backend.part_copy_calls(), 4);
    }

    #[tokio::test]
    async fn test_resume_unknown_upload() {
        let fixture = Fixture::new(15 * MIB);

        let error = fixture
            .copier(options(5 * MIB, 2))
            .resume("no-such-upload")
            .await
            .unwrap_err();
        assert_matches!(
            error,
            MultipartCopyError::ListParts {
                source: BackendError::NoSuchUpload { .. },
                ..
            }
        );
        assert_eq!(fixture.backend.part_copy_calls(), 0);
    }
}
