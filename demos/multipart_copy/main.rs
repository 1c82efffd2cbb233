//! Copy one S3 object to another location, in parts when it is large.
//!
//! ```shell
//! $ cargo run --example multipart_copy -- s3://source-bucket/large.bin s3://destination-bucket/copy.bin
//! ```
//!
//! Tuning is read from the `COBALT_COPY_*` environment variables, see
//! [cobalt_s3_copy::config::copy_options_from_env].
use std::sync::Arc;

use anyhow::Result;
use aws_sdk_s3::config::Builder;
use clap::Parser;
use cobalt_s3_copy::config::{copy_options_from_env, load_from_env};
use cobalt_s3_copy::s3::{Client, S3MultipartCopier, S3Object};
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    /// The object to copy, as `s3://bucket/key`.
    source: S3Object,
    /// Where to copy it to, as `s3://bucket/key`.
    destination: S3Object,
    /// Finish an earlier copy into this multipart upload instead of starting a new one.
    #[arg(long)]
    resume: Option<String>,
    /// Use path style addressing, as LocalStack requires.
    #[arg(long)]
    path_style: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    let options = copy_options_from_env()?;
    tracing::info!("Options: {:?}", options);

    let shared_config = load_from_env().await?;
    let client = Client::from_conf(
        Builder::from(&shared_config)
            .force_path_style(args.path_style)
            .build(),
    );

    let copier = S3MultipartCopier::builder()
        .backend(Arc::new(client))
        .source(args.source)
        .destination(args.destination)
        .options(options)
        .build();
    let completion = match args.resume {
        Some(upload_id) => copier.resume(&upload_id).await?,
        None => copier.send().await?,
    };

    println!("{}", serde_json::to_string_pretty(&completion)?);
    Ok(())
}
