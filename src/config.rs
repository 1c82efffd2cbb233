//! Configuration from the environment: a LocalStack aware
//! [aws_types::SdkConfig](https://docs.rs/aws-types/latest/aws_types/sdk_config/struct.SdkConfig.html)
//! and the [CopyOptions] used to tune a copy.

use std::ffi::OsString;
use std::iter::empty;
use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_types::SdkConfig;
use bytesize::ByteSize;
use clap::Parser;

use crate::localstack;
use crate::s3::{default_concurrency, CopyOptions, PartSize};

/// Create a shared `SdkConfig` with LocalStack support.
///
/// # Example
///
/// ```
/// use cobalt_s3_copy::config::load_from_env;
/// use cobalt_s3_copy::s3::Client;
///
/// # tokio_test::block_on(async {
/// let shared_config = load_from_env().await.unwrap();
/// let client = Client::new(&shared_config);
/// # })
/// ```
///
/// ## LocalStack
///
/// If you want to communicate with a LocalStack instance, set the environment
/// variable `LOCALSTACK_HOSTNAME`:
///
/// ```shell
/// $ export LOCALSTACK_HOSTNAME=localhost
/// ```
///
/// You can also optionally set the `EDGE_PORT` variable if you need something other
/// than the default of `4566`.
///
/// LocalStack serves S3 with path style addressing, so build S3 clients with
/// `force_path_style(true)` when targeting it.
///
/// See the [LocalStack configuration docs](https://docs.localstack.cloud/localstack/configuration/) for more info.
///
/// ## Errors
///
/// An error will be returned if `LOCALSTACK_HOSTNAME` is set and a valid URI cannot be constructed.
///
pub async fn load_from_env() -> Result<SdkConfig> {
    let mut shared_config = aws_config::from_env();
    if let Some(uri) = localstack::get_endpoint_uri()? {
        shared_config = shared_config.endpoint_url(uri.to_string());
    }
    Ok(shared_config.load().await)
}

/// Copy tuning read from environment variables.
#[derive(Debug, Parser)]
pub struct CopyEnv {
    /// Size of every part but the last, e.g. `64MiB`.
    #[arg(env = "COBALT_COPY_CHUNK_SIZE", default_value = "64MiB")]
    pub chunk_size: ByteSize,
    /// How many parts are copied at once. Defaults to the number of CPUs.
    #[arg(env = "COBALT_COPY_MAX_CONCURRENCY")]
    pub max_concurrency: Option<NonZeroUsize>,
    /// Seconds to wait for a single part copy before giving up on it.
    #[arg(env = "COBALT_COPY_PART_TIMEOUT_SECS")]
    pub part_timeout_secs: Option<u64>,
    /// Abort the upload when any part fails.
    #[arg(long, env = "COBALT_COPY_ABORT_ON_FAILURE")]
    pub abort_on_failure: bool,
}

impl CopyEnv {
    pub fn into_options(self) -> Result<CopyOptions> {
        let chunk_size = PartSize::try_from(self.chunk_size.as_u64())
            .context("COBALT_COPY_CHUNK_SIZE is not a valid part size")?;
        let mut options = CopyOptions::builder()
            .chunk_size(chunk_size)
            .max_concurrency(self.max_concurrency.unwrap_or_else(default_concurrency))
            .abort_on_failure(self.abort_on_failure)
            .build();
        options.part_timeout = self.part_timeout_secs.map(Duration::from_secs);
        Ok(options)
    }
}

/// Build [CopyOptions] from the `COBALT_COPY_*` environment variables.
///
/// | Variable | Default |
/// |---|---|
/// | `COBALT_COPY_CHUNK_SIZE` | `64MiB` |
/// | `COBALT_COPY_MAX_CONCURRENCY` | number of CPUs |
/// | `COBALT_COPY_PART_TIMEOUT_SECS` | no timeout |
/// | `COBALT_COPY_ABORT_ON_FAILURE` | `false` |
pub fn copy_options_from_env() -> Result<CopyOptions> {
    // Only environment variables are read; command line arguments belong to
    // the calling program.
    let env = CopyEnv::try_parse_from(empty::<OsString>())
        .context("An error occurred while parsing copy options from environment variables.")?;
    tracing::debug!("Env: {:?}", env);
    env.into_options()
}
