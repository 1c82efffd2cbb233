//! Partitioning of an object into the inclusive byte ranges copied as parts
//! of a multipart upload.

use std::iter::{FusedIterator, Rev};
use std::ops::Range;

use bytesize::{MIB, TIB};
use derive_more::{Display, Into};
use either::Either;
use serde::Serialize;
use thiserror::Error;

/// The smallest object that can be copied with a multipart upload, 5 MiB.
///
/// S3 rejects parts smaller than 5 MiB except for the final part, so anything
/// below this size has to be copied with a single `CopyObject` request.
pub const MIN_MULTIPART_SIZE: u64 = 5 * MIB;

/// The largest object S3 can store, 5 TiB.
pub const MAX_OBJECT_SIZE: u64 = 5 * TIB;

/// The maximum number of parts in a single multipart upload.
pub const MAX_PART_COUNT: u64 = 10_000;

/// The order in which [ByteRanges] are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// From offset 0 towards the end of the object.
    #[default]
    Forward,
    /// From the end of the object towards offset 0.
    Backward,
}

/// Errors raised while partitioning an object.
///
/// These are configuration errors: they are detected before any request is
/// sent and retrying with the same arguments can never succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Object must be at least {MIN_MULTIPART_SIZE} bytes for a multipart copy, object size was {0}. Use a single copy instead")]
    TooSmall(u64),
    #[error("Object must be at most {MAX_OBJECT_SIZE} bytes, object size was {0}")]
    TooLarge(u64),
    #[error("Chunk size must be greater than 0")]
    ZeroChunkSize,
    #[error("A chunk size of {chunk_size} splits {content_length} bytes into {part_count} parts, more than the {MAX_PART_COUNT} allowed. Increase the chunk size")]
    TooManyParts {
        content_length: u64,
        chunk_size: u64,
        part_count: u64,
    },
    #[error("Start index {start_index} is out of range for an object of {part_count} parts")]
    StartIndexOutOfRange { start_index: u64, part_count: u64 },
}

/// Errors that can occur when creating a [ByteRange].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ByteRangeError {
    #[error("The start byte must be less than or equal to the end byte \n start: {0}, end: {1}")]
    InvalidRange(u64, u64),
}

/// An inclusive range of byte offsets into an object.
///
/// Displays as the value of a `Range`/`x-amz-copy-source-range` header:
///
/// ```
/// use cobalt_s3_copy::s3::ByteRange;
///
/// let range = ByteRange::try_from((0, 499)).unwrap();
/// assert_eq!(range.to_string(), "bytes=0-499");
/// assert_eq!(range.size(), 500);
/// ```
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("bytes={start}-{end}")]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl TryFrom<(u64, u64)> for ByteRange {
    type Error = ByteRangeError;

    fn try_from((start, end): (u64, u64)) -> Result<Self, Self::Error> {
        if start > end {
            Err(ByteRangeError::InvalidRange(start, end))
        } else {
            Ok(ByteRange { start, end })
        }
    }
}

impl ByteRange {
    /// The first byte in the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// The last byte in the range (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// The number of bytes covered by the range.
    ///
    /// Saturates at `u64::MAX` for the range `0..=u64::MAX`, whose size of
    /// 2^64 bytes is not representable. Ranges from [partition] never get
    /// near this, since objects are at most [MAX_OBJECT_SIZE] bytes.
    pub fn size(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

/// Errors that can occur when creating a [PartNumber].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartNumberError {
    #[error("Part number must be between 1 and {MAX_PART_COUNT}, part number was {0}")]
    OutOfRange(i64),
}

/// The 1-based number of a part within a multipart upload, `1..=10000`.
#[derive(Debug, Display, Into, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartNumber(u32);

impl PartNumber {
    /// The number of the first part of an upload.
    pub const FIRST: PartNumber = PartNumber(1);

    pub fn get(self) -> u32 {
        self.0
    }

    /// Part number for the zero-based `index`-th range of a partition, which
    /// [partition] has already bounded by [MAX_PART_COUNT].
    fn from_index(index: usize) -> Self {
        PartNumber(index as u32 + 1)
    }
}

impl TryFrom<i64> for PartNumber {
    type Error = PartNumberError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (1..=MAX_PART_COUNT as i64).contains(&value) {
            Ok(PartNumber(value as u32))
        } else {
            Err(PartNumberError::OutOfRange(value))
        }
    }
}

impl TryFrom<i32> for PartNumber {
    type Error = PartNumberError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        PartNumber::try_from(i64::from(value))
    }
}

impl From<PartNumber> for i32 {
    fn from(value: PartNumber) -> Self {
        // Bounded by MAX_PART_COUNT.
        value.0 as i32
    }
}

/// A lazy, finite sequence of the [ByteRange]s covering an object.
///
/// Created by [partition]. Every call to [partition] returns an independent
/// sequence; nothing is shared between them.
#[derive(Debug, Clone)]
pub struct ByteRanges {
    indices: Either<Range<u64>, Rev<Range<u64>>>,
    content_length: u64,
    chunk_size: u64,
    part_count: u64,
}

impl ByteRanges {
    /// Total number of chunks the object splits into, regardless of the start
    /// index or how much of the sequence has been consumed.
    pub fn part_count(&self) -> u64 {
        self.part_count
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Pair each remaining range with its part number, counting from 1 in
    /// emission order.
    pub fn numbered(self) -> impl Iterator<Item = (PartNumber, ByteRange)> {
        self.enumerate()
            .map(|(index, range)| (PartNumber::from_index(index), range))
    }

    fn range_at(&self, index: u64) -> ByteRange {
        let start = index * self.chunk_size;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.content_length - 1);
        ByteRange { start, end }
    }
}

impl Iterator for ByteRanges {
    type Item = ByteRange;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        Some(self.range_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl FusedIterator for ByteRanges {}

/// Partition an object of `content_length` bytes into inclusive byte ranges of
/// `chunk_size` bytes. The final range is clamped to the end of the object.
///
/// Ranges are aligned to multiples of `chunk_size` from offset 0 in both
/// directions; [Direction::Backward] emits the same ranges as
/// [Direction::Forward] in reverse order. Backward chunks are not aligned to
/// the end of the object: when `content_length` is not a multiple of
/// `chunk_size`, the first backward range is the short one. `start_index`
/// skips that many chunks from the end the traversal begins at.
///
/// ```
/// use cobalt_s3_copy::s3::{partition, Direction};
///
/// let ranges: Vec<_> = partition(0, 15_728_640, 5_242_880, Direction::Forward)
///     .unwrap()
///     .map(|r| (r.start(), r.end()))
///     .collect();
/// assert_eq!(
///     ranges,
///     vec![(0, 5242879), (5242880, 10485759), (10485760, 15728639)]
/// );
///
/// // 12 MiB in 5 MiB chunks, backward: the 2 MiB tail comes first.
/// let ranges: Vec<_> = partition(0, 12_582_912, 5_242_880, Direction::Backward)
///     .unwrap()
///     .map(|r| (r.start(), r.end()))
///     .collect();
/// assert_eq!(
///     ranges,
///     vec![(10485760, 12582911), (5242880, 10485759), (0, 5242879)]
/// );
/// ```
///
/// # Errors
///
/// A [PartitionError] is returned, before anything is emitted, when the object
/// is smaller than [MIN_MULTIPART_SIZE] or larger than [MAX_OBJECT_SIZE], when
/// `chunk_size` is 0 or would produce more than [MAX_PART_COUNT] parts, or when
/// `start_index` lies beyond the last chunk.
pub fn partition(
    start_index: u64,
    content_length: u64,
    chunk_size: u64,
    direction: Direction,
) -> Result<ByteRanges, PartitionError> {
    if content_length < MIN_MULTIPART_SIZE {
        return Err(PartitionError::TooSmall(content_length));
    }
    if content_length > MAX_OBJECT_SIZE {
        return Err(PartitionError::TooLarge(content_length));
    }
    if chunk_size == 0 {
        return Err(PartitionError::ZeroChunkSize);
    }

    let part_count = content_length.div_ceil(chunk_size);
    if part_count > MAX_PART_COUNT {
        return Err(PartitionError::TooManyParts {
            content_length,
            chunk_size,
            part_count,
        });
    }
    if start_index >= part_count {
        return Err(PartitionError::StartIndexOutOfRange {
            start_index,
            part_count,
        });
    }

    let indices = match direction {
        Direction::Forward => Either::Left(start_index..part_count),
        Direction::Backward => Either::Right((0..part_count - start_index).rev()),
    };

    Ok(ByteRanges {
        indices,
        content_length,
        chunk_size,
        part_count,
    })
}
