//! Shared harness: a wiremock server standing in for the service and an
//! `ApiClient` wired to it with in-memory collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use restline_common::auth::state_key;
use restline_common::storage::MemoryStorage;
use restline_common::testing::{MemoryRedirectHost, RecordingSleeper};
use restline_common::{ApiError, StorageAdapter, Storages};
use restline_infra::config::DEFAULT_SESSION_KEY;
use restline_infra::{ApiClient, ApiClientBuilder, ClientConfig};
use url::Url;
use wiremock::MockServer;

pub const CALLBACK_URL: &str = "https://app.test/callback";

pub struct Harness {
    pub server: MockServer,
    pub browser: Arc<MemoryStorage>,
    pub host: MemoryRedirectHost,
    pub sleeper: RecordingSleeper,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            browser: Arc::new(MemoryStorage::new()),
            host: MemoryRedirectHost::new(Url::parse(CALLBACK_URL).expect("callback url")),
            sleeper: RecordingSleeper::new(),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("app-1").with_base_url(format!("{}/v1/", self.server.uri()))
    }

    pub fn builder(&self, config: ClientConfig) -> ApiClientBuilder {
        ApiClient::builder(config)
            .storages(Storages::new(Arc::new(MemoryStorage::new()), self.browser.clone()))
            .redirect_host(Arc::new(self.host.clone()))
            .sleeper(Arc::new(self.sleeper.clone()))
    }

    pub fn client(&self) -> ApiClient {
        self.builder(self.config()).build().expect("client")
    }

    pub fn store_state(&self, state: &str) {
        self.browser.set(&state_key(DEFAULT_SESSION_KEY), state).expect("store state");
    }

    pub fn land_on(&self, fragment: &str) {
        let mut url = Url::parse(CALLBACK_URL).expect("callback url");
        url.set_fragment(Some(fragment));
        self.host.set_current(url);
    }
}

/// Counts of the events a client raised.
#[derive(Default, Clone)]
pub struct EventLog {
    pub signed_out: Arc<AtomicUsize>,
    pub expired: Arc<AtomicUsize>,
    pub errors: Arc<Mutex<Vec<ApiError>>>,
}

impl EventLog {
    pub fn attach(client: &ApiClient) -> Self {
        let log = Self::default();
        let signed_out = log.signed_out.clone();
        client.on_signed_out(move || {
            signed_out.fetch_add(1, Ordering::SeqCst);
        });
        let expired = log.expired.clone();
        client.on_session_expired(move || {
            expired.fetch_add(1, Ordering::SeqCst);
        });
        let errors = log.errors.clone();
        client.on_error(move |e| errors.lock().push(e.clone()));
        log
    }

    pub fn signed_out(&self) -> usize {
        self.signed_out.load(Ordering::SeqCst)
    }

    pub fn expired(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<ApiError> {
        self.errors.lock().clone()
    }
}
