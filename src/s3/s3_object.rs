use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// A bucket/key pair addressing one object, either the source or the
/// destination of a copy.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// The bucket the object is in.
    pub bucket: String,
    /// The key of the object within the bucket.
    pub key: String,
}

impl S3Object {
    /// Create a new [S3Object]. Any leading `/` is trimmed from the key.
    /// No validation is done against AWS naming rules.
    pub fn new(bucket: impl AsRef<str>, key: impl AsRef<str>) -> Self {
        S3Object {
            bucket: bucket.as_ref().to_owned(),
            key: key.as_ref().trim_start_matches('/').to_owned(),
        }
    }

    /// The `x-amz-copy-source` value naming this object, `bucket/key`.
    pub fn copy_source(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for S3Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// The scheme must be `s3` and the path must not be empty.
impl TryFrom<Url> for S3Object {
    type Error = Error;

    fn try_from(value: Url) -> Result<Self, Self::Error> {
        if value.scheme() != "s3" {
            bail!("S3 URL must have a scheme of s3, got {}", value.scheme())
        }
        let bucket = value.host_str().context("S3 URL must have a bucket")?;
        let key = value.path().trim_start_matches('/');
        if key.is_empty() {
            bail!("S3 URL must have a key")
        }
        Ok(S3Object::new(bucket, key))
    }
}

impl FromStr for S3Object {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .parse::<Url>()
            .with_context(|| format!("Invalid S3 URL: {value}"))?
            .try_into()
    }
}

impl TryFrom<&S3Object> for Url {
    type Error = url::ParseError;

    fn try_from(obj: &S3Object) -> std::result::Result<Self, Self::Error> {
        Url::parse(&obj.to_string())
    }
}
