//! Discovery of a [LocalStack](https://localstack.cloud/) endpoint to run
//! copies against instead of AWS.

use anyhow::{Context, Result};
use http::Uri;
use std::env;
use std::str::FromStr;

/// Construct a LocalStack endpoint URI if the LOCALSTACK_HOSTNAME env var
/// has been set.
///
/// Ref: https://docs.localstack.cloud/localstack/configuration/
///
pub(crate) fn get_endpoint_uri() -> Result<Option<Uri>> {
    let Ok(host) = env::var("LOCALSTACK_HOSTNAME") else {
        return Ok(None);
    };
    let port = env::var("EDGE_PORT").unwrap_or_else(|_| "4566".to_string());
    let uri = format!("http://{host}:{port}");
    let uri = Uri::from_str(&uri).context(format!("Failed to parse LocalStack URI: {uri}"))?;
    Ok(Some(uri))
}
