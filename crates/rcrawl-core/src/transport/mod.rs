//! HTTP transport port: "execute one request, asynchronously, with a timeout".
//!
//! The engine never talks to the network directly; it hands a
//! `RequestRecord` to this port and routes the outcome. Tests script the
//! trait, production uses `HttpTransport`.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::request::RequestRecord;

/// A completed HTTP response: status, headers, raw body bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Transport-level failure classification.
///
/// Every variant funnels into the engine's failure path (retry then
/// permanent); the classification exists for log lines and the error
/// callback message, not for differing retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid method `{0}`")]
    Method(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request, honoring the configured per-request timeout.
    /// Non-2xx statuses surface as `TransportError::Status`.
    async fn execute(&self, record: &RequestRecord) -> Result<TransportResponse, TransportError>;
}
