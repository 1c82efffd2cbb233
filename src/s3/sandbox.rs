//! An in-memory [MultipartBackend] for tests.
//!
//! Objects are held as [Bytes] and part copies really copy the requested
//! range, so a completed upload can be compared byte for byte with its source.
//! Completion is validated the way S3 validates it. Failures, panics and
//! delays can be injected per part number.
//!
//! Enable the `test-utils` feature to use it outside this crate.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_s3::primitives::DateTime;
use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::backend::{
    BackendError, CompletedPartInfo, CompletionInfo, CopiedPart, MultipartBackend, ObjectInfo,
    UploadPartCopyRequest, UploadedPart,
};
use super::{ByteRange, PartNumber, S3Object, MIN_MULTIPART_SIZE};

/// Errors the in-memory backend reports where S3 would return an error code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Injected failure copying part {0}")]
    InjectedFailure(PartNumber),
    #[error("Range {range} is not satisfiable for an object of {content_length} bytes")]
    InvalidRange {
        range: ByteRange,
        content_length: u64,
    },
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,
    #[error("Part {0} was not uploaded or its ETag did not match")]
    InvalidPart(PartNumber),
    #[error("Part {0} is smaller than the minimum allowed size")]
    EntityTooSmall(PartNumber),
    #[error("A multipart upload must be completed with at least one part")]
    NoParts,
    #[error("Upload was created for {expected}, not {actual}")]
    WrongDestination { expected: S3Object, actual: S3Object },
}

impl From<SandboxError> for BackendError {
    fn from(value: SandboxError) -> Self {
        BackendError::Service(Box::new(value))
    }
}

/// A `CompleteMultipartUpload` request received by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub object: S3Object,
    pub upload_id: String,
    pub parts: Vec<CompletedPartInfo>,
}

#[derive(Debug)]
struct StoredPart {
    e_tag: String,
    data: Bytes,
}

#[derive(Debug)]
struct PendingUpload {
    object: S3Object,
    parts: BTreeMap<PartNumber, StoredPart>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<S3Object, Bytes>,
    uploads: HashMap<String, PendingUpload>,
    completions: Vec<CompletionRecord>,
    aborted: Vec<String>,
    created: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    failing: HashSet<PartNumber>,
    panicking: HashSet<PartNumber>,
    delays: HashMap<PartNumber, Duration>,
}

/// Decrements the in-flight counter when a part copy finishes, however it
/// finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(current, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// See the [module docs](self).
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    next_upload_id: AtomicU64,
    part_copy_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn digest(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn e_tag_of(data: &[u8]) -> String {
    format!("\"{}\"", digest(data))
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object, returning its ETag.
    pub fn put_object(&self, object: &S3Object, data: impl Into<Bytes>) -> String {
        let data = data.into();
        let e_tag = e_tag_of(&data);
        self.state().objects.insert(object.clone(), data);
        e_tag
    }

    pub fn get_object(&self, object: &S3Object) -> Option<Bytes> {
        self.state().objects.get(object).cloned()
    }

    /// Every copy of `part_number` fails with [SandboxError::InjectedFailure].
    pub fn fail_part(&self, part_number: PartNumber) {
        self.faults().failing.insert(part_number);
    }

    /// Every copy of `part_number` panics.
    pub fn panic_on_part(&self, part_number: PartNumber) {
        self.faults().panicking.insert(part_number);
    }

    /// Every copy of `part_number` sleeps for `delay` before doing anything.
    pub fn delay_part(&self, part_number: PartNumber, delay: Duration) {
        self.faults().delays.insert(part_number, delay);
    }

    /// The number of `UploadPartCopy` requests received.
    pub fn part_copy_calls(&self) -> usize {
        self.part_copy_calls.load(Ordering::SeqCst)
    }

    /// The largest number of part copies that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Upload ids in creation order.
    pub fn created_uploads(&self) -> Vec<String> {
        self.state().created.clone()
    }

    /// Upload ids that have neither been completed nor aborted.
    pub fn open_uploads(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.state().uploads.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn aborted_uploads(&self) -> Vec<String> {
        self.state().aborted.clone()
    }

    pub fn completions(&self) -> Vec<CompletionRecord> {
        self.state().completions.clone()
    }

    fn source_slice(
        objects: &HashMap<S3Object, Bytes>,
        source: &S3Object,
        range: ByteRange,
    ) -> Result<Bytes, BackendError> {
        let data = objects
            .get(source)
            .ok_or_else(|| BackendError::NotFound(source.clone()))?;
        let invalid = || SandboxError::InvalidRange {
            range,
            content_length: data.len() as u64,
        };
        let start = usize::try_from(range.start()).map_err(|_| invalid())?;
        let end = usize::try_from(range.end()).map_err(|_| invalid())?;
        if end >= data.len() {
            return Err(invalid().into());
        }
        Ok(data.slice(start..=end))
    }
}

#[async_trait]
impl MultipartBackend for InMemoryBackend {
    async fn head_object(&self, object: &S3Object) -> Result<ObjectInfo, BackendError> {
        let state = self.state();
        let data = state
            .objects
            .get(object)
            .ok_or_else(|| BackendError::NotFound(object.clone()))?;
        Ok(ObjectInfo {
            content_length: data.len() as u64,
            e_tag: Some(e_tag_of(data)),
        })
    }

    async fn create_multipart_upload(&self, object: &S3Object) -> Result<String, BackendError> {
        let upload_id = format!(
            "upload-{}",
            self.next_upload_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        let mut state = self.state();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                object: object.clone(),
                parts: BTreeMap::new(),
            },
        );
        state.created.push(upload_id.clone());
        Ok(upload_id)
    }

    async fn upload_part_copy(
        &self,
        request: &UploadPartCopyRequest<'_>,
    ) -> Result<CopiedPart, BackendError> {
        self.part_copy_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);

        let part_number = request.part_number;
        let (delay, fail, panic) = {
            let faults = self.faults();
            (
                faults.delays.get(&part_number).copied(),
                faults.failing.contains(&part_number),
                faults.panicking.contains(&part_number),
            )
        };
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        if panic {
            panic!("injected panic copying part {part_number}");
        }
        if fail {
            return Err(SandboxError::InjectedFailure(part_number).into());
        }

        let mut state = self.state();
        let data = Self::source_slice(&state.objects, request.source, request.byte_range)?;
        let upload = state.uploads.get_mut(request.upload_id).ok_or_else(|| {
            BackendError::NoSuchUpload {
                object: request.destination.clone(),
                upload_id: request.upload_id.to_owned(),
            }
        })?;
        if &upload.object != request.destination {
            return Err(SandboxError::WrongDestination {
                expected: upload.object.clone(),
                actual: request.destination.clone(),
            }
            .into());
        }

        let e_tag = e_tag_of(&data);
        upload.parts.insert(
            part_number,
            StoredPart {
                e_tag: e_tag.clone(),
                data,
            },
        );
        Ok(CopiedPart {
            e_tag,
            last_modified: Some(DateTime::from(SystemTime::now())),
        })
    }

    async fn list_parts(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, BackendError> {
        let state = self.state();
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| BackendError::NoSuchUpload {
                object: object.clone(),
                upload_id: upload_id.to_owned(),
            })?;
        Ok(upload
            .parts
            .iter()
            .map(|(part_number, part)| UploadedPart {
                part_number: *part_number,
                e_tag: part.e_tag.clone(),
                size: part.data.len() as u64,
            })
            .collect())
    }

    async fn complete_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<CompletionInfo, BackendError> {
        let mut state = self.state();
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| BackendError::NoSuchUpload {
                object: object.clone(),
                upload_id: upload_id.to_owned(),
            })?;

        if parts.is_empty() {
            return Err(SandboxError::NoParts.into());
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(SandboxError::InvalidPartOrder.into());
        }

        let mut body = BytesMut::new();
        for (index, part) in parts.iter().enumerate() {
            let stored = upload
                .parts
                .get(&part.part_number)
                .filter(|stored| stored.e_tag == part.e_tag)
                .ok_or(SandboxError::InvalidPart(part.part_number))?;
            let is_last = index == parts.len() - 1;
            if !is_last && (stored.data.len() as u64) < MIN_MULTIPART_SIZE {
                return Err(SandboxError::EntityTooSmall(part.part_number).into());
            }
            body.extend_from_slice(&stored.data);
        }

        let e_tag = format!("\"{}-{}\"", digest(&body), parts.len());
        state.uploads.remove(upload_id);
        state.objects.insert(object.clone(), body.freeze());
        state.completions.push(CompletionRecord {
            object: object.clone(),
            upload_id: upload_id.to_owned(),
            parts: parts.to_vec(),
        });
        Ok(CompletionInfo::new(
            object,
            Some(e_tag),
            Some(object.to_string()),
        ))
    }

    async fn abort_multipart_upload(
        &self,
        object: &S3Object,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| BackendError::NoSuchUpload {
                object: object.clone(),
                upload_id: upload_id.to_owned(),
            })?;
        state.aborted.push(upload_id.to_owned());
        Ok(())
    }

    async fn copy_object(
        &self,
        source: &S3Object,
        destination: &S3Object,
    ) -> Result<CompletionInfo, BackendError> {
        let mut state = self.state();
        let data = state
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(source.clone()))?;
        let e_tag = e_tag_of(&data);
        state.objects.insert(destination.clone(), data);
        Ok(CompletionInfo::new(destination, Some(e_tag), None))
    }
}
