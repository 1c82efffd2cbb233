//! Server-side copy of [aws_sdk_s3](https://docs.rs/aws-sdk-s3/latest/aws_sdk_s3/) objects
//! of any size.
//!
//! Start with [S3MultipartCopier], or call [copy_object_multipart] directly.
//! Both take a [SharedBackend]; use `Arc::new(client)` for a real [Client].

/// Re-export of [aws_sdk_s3::client::Client](https://docs.rs/aws-sdk-s3/latest/aws_sdk_s3/client/struct.Client.html).
///
pub use aws_sdk_s3::Client;

mod backend;
mod byte_range;
mod client;
mod copy_options;
mod multipartcopy;
mod part_copy;
mod s3_object;
#[cfg(any(test, feature = "test-utils"))]
pub mod sandbox;

pub use backend::{
    BackendError, CompletedPartInfo, CompletionInfo, CopiedPart, MultipartBackend, ObjectInfo,
    SharedBackend, UploadPartCopyRequest, UploadedPart,
};
pub use byte_range::{
    partition, ByteRange, ByteRangeError, ByteRanges, Direction, PartNumber, PartNumberError,
    PartitionError, MAX_OBJECT_SIZE, MAX_PART_COUNT, MIN_MULTIPART_SIZE,
};
pub use copy_options::{
    default_concurrency, CopyOptions, PartSize, PartSizeError, DEFAULT_CHUNK_SIZE, MAX_PART_SIZE,
    MIN_PART_SIZE,
};
pub use multipartcopy::{
    copy_object_multipart, copy_parts, copy_remaining_parts, AggregateOutcome,
    MultipartCopyError, S3MultipartCopier,
};
pub use part_copy::{copy_part, CopySpec, PartError, PartFailure, PartResult, PartSuccess};
pub use s3_object::S3Object;
