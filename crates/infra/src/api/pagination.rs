//! Paged listings and their aggregation
//!
//! A listing endpoint answers `{offset, limit, total, items}` pages.
//! [`aggregate`] walks pages until the accumulated count reaches `total` or a
//! page comes back empty; the empty page is the real termination guarantee,
//! `total` is only a hint.

use async_trait::async_trait;
use restline_common::ApiResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::client::ApiClient;
use super::resources::RequestOptions;

/// Page size requested by [`ApiClient::list_all`].
pub const PAGE_LIMIT: u64 = 500;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "Vec::new", alias = "objects")]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Synthetic page describing a complete collection.
    #[must_use]
    pub fn complete(items: Vec<T>) -> Self {
        let count = items.len() as u64;
        Self { offset: 0, limit: count, total: count, items }
    }
}

/// Paging parameters for [`ApiClient::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub limit: u64,
    pub offset: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self { limit: PAGE_LIMIT, offset: 0 }
    }
}

/// Anything that can fetch one page.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch(&self, params: ListParams) -> ApiResult<Page<T>>;
}

/// Drive `source` to completion.
///
/// # Errors
/// The first page fetch that fails.
pub async fn aggregate<T, S>(source: &S, limit: u64) -> ApiResult<Page<T>>
where
    T: Send,
    S: PageSource<T> + ?Sized,
{
    let mut items = Vec::new();
    let mut params = ListParams { limit, offset: 0 };

    loop {
        let page = source.fetch(params).await?;
        let received = page.items.len();
        debug!(offset = params.offset, received, total = page.total, "fetched page");
        if received == 0 {
            break;
        }

        let step = if page.limit == 0 { received as u64 } else { page.limit };
        let total = page.total;
        params.offset = page.offset.saturating_add(step);
        items.extend(page.items);

        if items.len() as u64 >= total {
            break;
        }
    }

    Ok(Page::complete(items))
}

struct ClientPages<'a> {
    client: &'a ApiClient,
    uri: &'a str,
    options: &'a RequestOptions,
}

#[async_trait]
impl<T> PageSource<T> for ClientPages<'_>
where
    T: DeserializeOwned + Send,
{
    async fn fetch(&self, params: ListParams) -> ApiResult<Page<T>> {
        self.client.list(self.uri, params, self.options).await
    }
}

impl ApiClient {
    /// One page of `uri`.
    ///
    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::Decode`.
    #[instrument(skip(self, options))]
    pub async fn list<T>(
        &self,
        uri: &str,
        params: ListParams,
        options: &RequestOptions,
    ) -> ApiResult<Page<T>>
    where
        T: DeserializeOwned,
    {
        let options = options
            .clone()
            .with_query("limit", params.limit)
            .with_query("offset", params.offset);
        self.get(uri, &options).await
    }

    /// Every item of `uri`, fetched [`PAGE_LIMIT`] at a time.
    ///
    /// # Errors
    /// The first page fetch that fails.
    #[instrument(skip(self, options))]
    pub async fn list_all<T>(&self, uri: &str, options: &RequestOptions) -> ApiResult<Page<T>>
    where
        T: DeserializeOwned + Send,
    {
        let source = ClientPages { client: self, uri, options };
        aggregate(&source, PAGE_LIMIT).await
    }
}
