use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, Response};
use restline_common::error::{ERROR_KEY, RATE_LIMIT_KEY, RETRY_AFTER_KEY};
use restline_common::transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ResponseKind,
};
use restline_common::{ApiError, ApiResult, HttpFailure};
use serde_json::{json, Map, Value};
use tracing::debug;

/// `reqwest`-backed [`HttpTransport`].
///
/// Performs exactly one exchange per call. Non-2xx responses become an
/// [`HttpFailure`] carrying the decoded body; a `Retry-After` response header
/// on a 429 is folded into the payload at `@error.@rateLimit` unless the body
/// already carries one.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Start building a new transport.
    #[must_use]
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    /// Returns `ApiError::Transport` if the TLS backend cannot be initialised.
    pub fn new() -> ApiResult<Self> {
        Self::builder().build()
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    async fn into_failure(response: Response) -> HttpFailure {
        let status = response.status().as_u16();
        let retry_after = header_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let mut payload = decode_body(&text);

        if status == 429 {
            if let Some(seconds) = retry_after {
                payload = fold_retry_after(payload, seconds);
            }
        }
        HttpFailure::new(status, payload)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpFailure> {
        let method = Self::method(request.method);
        debug!(%method, url = %request.url, "sending HTTP request");

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|err| {
            debug!(%method, url = %request.url, error = %err, "HTTP request failed");
            HttpFailure::network(err.to_string())
        })?;

        let status = response.status();
        debug!(%method, url = %request.url, %status, "received HTTP response");

        if !status.is_success() {
            return Err(Self::into_failure(response).await);
        }

        let status = status.as_u16();
        match request.response_kind {
            ResponseKind::Binary => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| HttpFailure::network(err.to_string()))?;
                Ok(HttpResponse::binary(status, bytes.to_vec()))
            }
            ResponseKind::Json => {
                let text =
                    response.text().await.map_err(|err| HttpFailure::network(err.to_string()))?;
                Ok(HttpResponse::json(status, decode_body(&text)))
            }
        }
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: Some(concat!("restline/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: None,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Overall per-request timeout; requests may override it.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// Returns `ApiError::Transport` if the client cannot be built.
    pub fn build(self) -> ApiResult<ReqwestTransport> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|err| ApiError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(ReqwestTransport { client })
    }
}

/// JSON if the body parses as JSON, the raw text otherwise, `Null` if empty.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn header_retry_after(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
}

fn fold_retry_after(payload: Value, seconds: f64) -> Value {
    let mut object = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("message".to_string(), other);
            map
        }
    };

    let error = object.entry(ERROR_KEY).or_insert_with(|| json!({}));
    if let Value::Object(error) = error {
        error
            .entry(RATE_LIMIT_KEY)
            .or_insert_with(|| json!({ RETRY_AFTER_KEY: seconds }));
    }
    Value::Object(object)
}
