use std::num::NonZeroUsize;
use std::time::Duration;

use bytesize::{GIB, MIB};
use derive_more::{AsRef, Display, Into};
use thiserror::Error;
use typed_builder::TypedBuilder;

use super::MIN_MULTIPART_SIZE;

/// The minimum part size S3 accepts for every part but the last, 5 MiB.
pub const MIN_PART_SIZE: u64 = MIN_MULTIPART_SIZE;

/// The maximum part size S3 accepts, 5 GiB.
pub const MAX_PART_SIZE: u64 = 5 * GIB;

/// The chunk size used when none is configured, 64 MiB.
///
/// At this size objects up to 625 GiB fit in 10,000 parts; larger objects need
/// a larger chunk size.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * MIB;

/// A chunk size that S3 will accept as the size of a multipart upload part.
#[derive(Debug, Display, Into, AsRef, Clone, Copy, PartialEq, Eq)]
pub struct PartSize(u64);

impl Default for PartSize {
    fn default() -> Self {
        PartSize(DEFAULT_CHUNK_SIZE)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartSizeError {
    #[error("part_size must be at least {MIN_PART_SIZE} bytes. part_size was {0}")]
    TooSmall(u64),
    #[error("part_size must be at most {MAX_PART_SIZE} bytes, part_size was {0}")]
    TooLarge(u64),
}

impl TryFrom<u64> for PartSize {
    type Error = PartSizeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < MIN_PART_SIZE {
            Err(PartSizeError::TooSmall(value))
        } else if value > MAX_PART_SIZE {
            Err(PartSizeError::TooLarge(value))
        } else {
            Ok(PartSize(value))
        }
    }
}

impl PartSize {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One part copy per available CPU, or 1 if that can't be determined.
pub fn default_concurrency() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Tuning for a multipart copy.
///
/// ```
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
/// use cobalt_s3_copy::s3::{CopyOptions, PartSize};
///
/// let options = CopyOptions::builder()
///     .chunk_size(PartSize::try_from(128 * 1024 * 1024_u64).unwrap())
///     .max_concurrency(NonZeroUsize::new(16).unwrap())
///     .part_timeout(Duration::from_secs(300))
///     .abort_on_failure(true)
///     .build();
/// assert_eq!(options.chunk_size.get(), 128 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct CopyOptions {
    /// Size of every part but the last.
    #[builder(default)]
    pub chunk_size: PartSize,
    /// How many part copies may be in flight at once.
    #[builder(default = default_concurrency())]
    pub max_concurrency: NonZeroUsize,
    /// Give up on a single part copy after this long. Unlimited by default,
    /// leaving timeouts to the client's own configuration.
    #[builder(default, setter(strip_option))]
    pub part_timeout: Option<Duration>,
    /// Abort the multipart upload if any part fails. When `false` the upload
    /// is left in place for the caller to retry or abort.
    #[builder(default)]
    pub abort_on_failure: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions::builder().build()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod arbitrary {
    use proptest::prelude::*;

    use super::{PartSize, MAX_PART_SIZE, MIN_PART_SIZE};

    impl Arbitrary for PartSize {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (MIN_PART_SIZE..=MAX_PART_SIZE).prop_map(PartSize).boxed()
        }
    }
}
