//! Seed normalization: raw seed item -> validated `RequestRecord`.

use std::borrow::Cow;

use thiserror::Error;
use url::Url;

use super::{RequestRecord, SeedItem};

/// Why a seed item was rejected. Rejected seeds are skipped and logged,
/// never enqueued and never fatal to the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid uri `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// Turn a raw seed item into a canonical `RequestRecord`.
///
/// A bare scalar becomes `GET base_uri + scalar`; a structured spec gets the
/// base URI prepended and a GET default for a missing method. The resolved
/// URI must validate (see `validate_uri`) before the record is accepted.
pub fn normalize(item: SeedItem, base_uri: &str) -> Result<RequestRecord, NormalizeError> {
    let record = match item {
        SeedItem::Bare(scalar) => RequestRecord {
            method: "GET".to_string(),
            uri: format!("{base_uri}{scalar}"),
            headers: Default::default(),
            callback_data: serde_json::Value::Null,
            options: serde_json::Value::Null,
        },
        SeedItem::Full(spec) => RequestRecord {
            method: spec.method.unwrap_or_else(|| "GET".to_string()),
            uri: format!("{base_uri}{}", spec.uri),
            headers: spec.headers,
            callback_data: spec.callback_data,
            options: spec.options,
        },
    };
    validate_uri(&record.uri)?;
    Ok(record)
}

/// Validate that `uri` parses as an absolute URL.
///
/// A URI without an `http:`/`https:` scheme is checked with `http:` prepended,
/// but the prepended scheme is never persisted: the record keeps the URI
/// exactly as resolved from the seed.
pub fn validate_uri(uri: &str) -> Result<(), NormalizeError> {
    let check: Cow<'_, str> = if uri.starts_with("http:") || uri.starts_with("https:") {
        Cow::Borrowed(uri)
    } else {
        Cow::Owned(format!("http:{uri}"))
    };
    Url::parse(&check).map_err(|err| NormalizeError::InvalidUri {
        uri: check.into_owned(),
        reason: err.to_string(),
    })?;
    Ok(())
}
