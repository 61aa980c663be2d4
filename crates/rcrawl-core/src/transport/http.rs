//! reqwest-backed transport implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};

use super::{Transport, TransportError, TransportResponse};
use crate::request::RequestRecord;

/// Async HTTP client with a per-request timeout baked into the client.
///
/// One client per crawler; reqwest pools connections internally, which is
/// what keeps a bounded window of requests against the same host cheap.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

fn header_map(record: &RequestRecord) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::with_capacity(record.headers.len());
    for (name, value) in &record.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Other(format!("invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Other(format!("invalid header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, record: &RequestRecord) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(record.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::Method(record.method.clone()))?;

        let response = self
            .client
            .request(method, &record.uri)
            .headers(header_map(record)?)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}
