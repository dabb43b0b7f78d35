//! HTTP transport collaborator
//!
//! The request pipeline never talks to a concrete HTTP client. It builds an
//! [`HttpRequest`] and hands it to an [`HttpTransport`]; `restline-infra`
//! provides the `reqwest` implementation and tests provide scripted ones.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HttpFailure;

/// HTTP verbs used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the response body should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    Binary,
}

/// A fully described request, cloneable so it can be replayed on retry.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub response_kind: ResponseKind,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            response_kind: ResponseKind::Json,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, params: &[(String, String)]) -> Self {
        self.query.extend_from_slice(params);
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn binary(mut self) -> Self {
        self.response_kind = ResponseKind::Binary;
        self
    }

    /// Value of the first header with this name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Binary(Vec<u8>),
}

/// A 2xx response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl HttpResponse {
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, body: ResponseBody::Json(body) }
    }

    #[must_use]
    pub fn binary(status: u16, bytes: Vec<u8>) -> Self {
        Self { status, body: ResponseBody::Binary(bytes) }
    }

    /// JSON body, or `Value::Null` for binary bodies.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self.body {
            ResponseBody::Json(value) => value,
            ResponseBody::Binary(_) => Value::Null,
        }
    }

    /// Raw bytes; JSON bodies are re-serialized.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            ResponseBody::Binary(bytes) => bytes,
            ResponseBody::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// Performs one HTTP exchange. Non-2xx responses and network errors are
/// returned as [`HttpFailure`]; implementations must not retry on their own.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpFailure>;
}
