//! Account-scoped CRUD operations
//!
//! Every operation resolves its URI under `accounts/{id}/` (unless
//! [`RequestOptions::global`]), carries the current token, and runs through
//! the retry engine. Terminal failures propagate unchanged.

use std::time::Duration;

use restline_common::transport::HttpMethod;
use restline_common::ApiResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::client::ApiClient;

/// Upper bound on a single download exchange.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Resolve against the service root instead of the account.
    pub global: bool,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn global() -> Self {
        Self { global: true, ..Self::default() }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

impl ApiClient {
    /// `POST` a new resource.
    ///
    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::Decode`.
    #[instrument(skip(self, body, options))]
    pub async fn create<B, T>(&self, uri: &str, body: &B, options: &RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.exchange(HttpMethod::Post, uri, Some(serde_json::to_value(body)?), options).await
    }

    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::Decode`.
    #[instrument(skip(self, options))]
    pub async fn get<T>(&self, uri: &str, options: &RequestOptions) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.exchange(HttpMethod::Get, uri, None, options).await
    }

    /// `PUT` a full replacement.
    ///
    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::Decode`.
    #[instrument(skip(self, body, options))]
    pub async fn replace<B, T>(&self, uri: &str, body: &B, options: &RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.exchange(HttpMethod::Put, uri, Some(serde_json::to_value(body)?), options).await
    }

    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::Decode`.
    #[instrument(skip(self, body, options))]
    pub async fn patch<B, T>(&self, uri: &str, body: &B, options: &RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.exchange(HttpMethod::Patch, uri, Some(serde_json::to_value(body)?), options).await
    }

    /// `DELETE`, optionally with a JSON body. Returns whatever the server sent
    /// (`Value::Null` for 204).
    ///
    /// # Errors
    /// The retry engine's terminal failure.
    #[instrument(skip(self, body, options))]
    pub async fn delete(
        &self,
        uri: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> ApiResult<Value> {
        self.exchange(HttpMethod::Delete, uri, body, options).await
    }

    /// Raw bytes of a resource, bounded by [`DOWNLOAD_TIMEOUT`].
    ///
    /// # Errors
    /// The retry engine's terminal failure; a timeout surfaces as a network
    /// failure.
    #[instrument(skip(self, options))]
    pub async fn download(&self, uri: &str, options: &RequestOptions) -> ApiResult<Vec<u8>> {
        let request = self.request(HttpMethod::Get, uri, options)?.binary().timeout(DOWNLOAD_TIMEOUT);
        Ok(self.send(request).await?.into_bytes())
    }

    async fn exchange<T>(
        &self,
        method: HttpMethod,
        uri: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let mut request = self.request(method, uri, options)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let value = self.send(request).await?.into_json();
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_collect_query_pairs() {
        let options = RequestOptions::global().with_query("limit", 500).with_query("q", "a b");
        assert!(options.global);
        assert_eq!(
            options.query,
            vec![("limit".to_string(), "500".to_string()), ("q".to_string(), "a b".to_string())]
        );
    }
}
