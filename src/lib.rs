//! # Cobalt S3 copy
//!
//! Server-side copy of S3 objects of any size, built on the
//! [aws-sdk-rust](https://github.com/awslabs/aws-sdk-rust) S3 client.
//!
//! Objects larger than a single part are copied with a multipart upload: the
//! source is split into byte ranges, each range is copied into its own part
//! with `UploadPartCopy` by a bounded pool of concurrent tasks, and the upload
//! is completed once every part has been copied. See [s3::S3MultipartCopier].
//!
//! The storage operations are behind the [s3::MultipartBackend] trait, so the
//! same code runs against AWS, [LocalStack](https://localstack.cloud/), or the
//! in-memory backend enabled by the `test-utils` feature.
//!
//! ### About harrison.ai
//!
//! This crate is maintained by the Data Engineering team at [harrison.ai](https://harrison.ai).
//!
//! At [harrison.ai](https://harrison.ai) our mission is to create AI-as-a-medical-device solutions through
//! ventures and ultimately improve the standard of healthcare for 1 million lives every day.
//!

// Public modules

pub mod config;
pub mod s3;
// Internal shared modules
mod localstack;
