//! Request model: canonical request records and raw seed items.

mod normalize;

pub use normalize::{normalize, validate_uri, NormalizeError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical, serializable description of one crawl request.
///
/// The serialized form (`canonical()`) doubles as the record's identity key:
/// it backs seed deduplication and retry counting, so serialization must be
/// deterministic. Field order is fixed by the struct and headers use a
/// `BTreeMap`, which keeps the JSON stable for equal records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Opaque payload handed back to the success callback.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub callback_data: serde_json::Value,
    /// Opaque transport options, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl RequestRecord {
    /// Deterministic serialized form, used as the dedup/retry identity key.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Structured seed item: a request spec with optional method (defaults to GET).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Path or URI fragment; the job's base URI is prepended during
    /// normalization.
    pub uri: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub callback_data: serde_json::Value,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// One raw item from a seed producer: either a bare identifier that becomes a
/// GET against the base URI, or a full request spec.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedItem {
    Bare(String),
    Full(RequestSpec),
}

impl From<String> for SeedItem {
    fn from(value: String) -> Self {
        SeedItem::Bare(value)
    }
}

impl From<&str> for SeedItem {
    fn from(value: &str) -> Self {
        SeedItem::Bare(value.to_string())
    }
}

impl From<u64> for SeedItem {
    fn from(value: u64) -> Self {
        SeedItem::Bare(value.to_string())
    }
}

impl From<RequestSpec> for SeedItem {
    fn from(value: RequestSpec) -> Self {
        SeedItem::Full(value)
    }
}
