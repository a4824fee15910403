//! Engine transport boundary
//!
//! Everything above this module speaks [`TransportRequest`] /
//! [`TransportResponse`]; [`HttpTransport`] is the reqwest implementation.

pub mod http;

pub use http::HttpTransport;

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Escaped in a path segment: URL delimiters, `/` and `%`. Wildcards and
/// commas in index patterns pass through.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// Percent-encode one path segment
pub fn segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Absolute path from raw segments, each percent-encoded
pub fn path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .fold(String::new(), |mut path, s| {
            path.push('/');
            path.push_str(&segment(s.as_ref()));
            path
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Newline delimited JSON, each line terminated by `\n`
    NdJson(String),
}

impl RequestBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::NdJson(_) => "application/x-ndjson",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            RequestBody::Json(value) => Ok(serde_json::to_vec(value)?),
            RequestBody::NdJson(lines) => Ok(lines.as_bytes().to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute path, e.g. `/hero-*/_search`
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Operation label for logs and metrics
    pub operation: &'static str,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>, operation: &'static str) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            operation,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn ndjson(mut self, lines: String) -> Self {
        self.body = Some(RequestBody::NdJson(lines));
        self
    }

    /// Value of a query parameter
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    /// Path with the url-encoded query string
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn non-2xx responses into [`Error::Engine`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::from_engine_response(self.status, &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        (**self).send(request).await
    }
}
