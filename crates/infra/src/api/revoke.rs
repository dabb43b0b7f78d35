use std::sync::Arc;

use async_trait::async_trait;
use restline_common::auth::TokenRevoker;
use restline_common::transport::{HttpMethod, HttpRequest, HttpTransport};
use restline_common::ApiResult;
use tracing::debug;
use url::Url;

/// Revokes the remote token with `DELETE {revokePath}`.
///
/// One attempt only; the retry engine is not involved.
pub struct TransportRevoker {
    transport: Arc<dyn HttpTransport>,
    url: Url,
}

impl TransportRevoker {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, url: Url) -> Self {
        Self { transport, url }
    }
}

#[async_trait]
impl TokenRevoker for TransportRevoker {
    async fn revoke(&self, token: &str) -> ApiResult<()> {
        let request =
            HttpRequest::new(HttpMethod::Delete, self.url.as_str()).header("Authorization", token);
        self.transport.send(request).await?;
        debug!(url = %self.url, "token revoked");
        Ok(())
    }
}
