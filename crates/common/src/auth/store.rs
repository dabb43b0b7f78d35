//! Token/session store with scheduled expiry
//!
//! Owns the single active [`Session`] of a client, persists it through a
//! [`StorageAdapter`] and arms one expiry timer per session. The timer fires
//! `EXPIRY_SKEW_MS` before the stated expiration, clears the session and
//! raises `onSessionExpired` exactly once.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::Session;
use crate::error::{ApiError, ApiResult};
use crate::events::SessionEvents;
use crate::storage::StorageAdapter;
use crate::time::Clock;

/// Safety margin subtracted from the expiration before expiring locally.
pub const EXPIRY_SKEW_MS: i64 = 10_000;

/// Largest single-shot timer delay; longer waits are split.
pub const MAX_TIMER_DELAY_MS: i64 = 2_147_483_647;

/// Revokes a bearer token at the provider.
#[async_trait]
pub trait TokenRevoker: Send + Sync {
    /// # Errors
    /// Returns the provider's failure; callers treat revocation as best effort.
    async fn revoke(&self, token: &str) -> ApiResult<()>;
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl State {
    /// Invalidates any armed timer. Returns the new generation.
    fn bump(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

struct Inner {
    storage: Arc<dyn StorageAdapter>,
    key: String,
    clock: Arc<dyn Clock>,
    events: Arc<SessionEvents>,
    revoker: RwLock<Option<Arc<dyn TokenRevoker>>>,
    state: Mutex<State>,
}

impl Inner {
    /// Expires the active session. With `generation`, only if no newer session
    /// was armed since that timer was scheduled.
    fn expire(&self, generation: Option<u64>) {
        let expired = {
            let mut state = self.state.lock();
            if generation.is_some_and(|g| g != state.generation) {
                debug!("stale expiry timer ignored");
                return;
            }
            if generation.is_some() {
                // Called from the timer task itself; dropping the handle detaches it.
                state.timer = None;
                state.generation = state.generation.wrapping_add(1);
            } else {
                state.bump();
            }
            state.session.take()
        };

        let Some(session) = expired else {
            return;
        };

        if let Err(e) = self.storage.remove(&self.key) {
            warn!(error = %e, "failed to erase persisted session");
        }
        info!(account = %session.id, "session expired");
        self.events.emit_session_expired();

        let revoker = self.revoker.read().clone();
        if let Some(revoker) = revoker {
            spawn_revocation(revoker, session.token, self.events.clone());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

fn spawn_revocation(revoker: Arc<dyn TokenRevoker>, token: String, events: Arc<SessionEvents>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = revoker.revoke(&token).await {
                    warn!(error = %e, "token revocation after expiry failed");
                    events.emit_error(&e);
                }
            });
        }
        Err(_) => warn!("no runtime available; skipping token revocation"),
    }
}

/// Owner of the active session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        key: impl Into<String>,
        clock: Arc<dyn Clock>,
        events: Arc<SessionEvents>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                key: key.into(),
                clock,
                events,
                revoker: RwLock::new(None),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Revoke the remote token whenever a session expires.
    pub fn set_expiry_revoker(&self, revoker: Option<Arc<dyn TokenRevoker>>) {
        *self.inner.revoker.write() = revoker;
    }

    /// Storage key the session is persisted under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// Loads a persisted session and installs it if it has not expired.
    ///
    /// Returns whether a session was installed. Unreadable or expired
    /// persisted copies are erased.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the backend fails, or the errors of
    /// [`SessionStore::set_session`].
    pub fn restore(&self) -> ApiResult<bool> {
        let Some(raw) = self.inner.storage.get(&self.inner.key)? else {
            debug!(key = %self.inner.key, "no persisted session");
            return Ok(false);
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted session");
                self.inner.storage.remove(&self.inner.key)?;
                return Ok(false);
            }
        };

        if session.expires_within(self.now_millis(), 0) {
            debug!(account = %session.id, "persisted session already expired");
            self.inner.storage.remove(&self.inner.key)?;
            return Ok(false);
        }

        self.set_session(session)?;
        Ok(self.is_authenticated())
    }

    /// Replaces the active session.
    ///
    /// A session with an expiration gets a timer firing `EXPIRY_SKEW_MS`
    /// before it; if that moment has already passed, expired-session handling
    /// runs immediately and nothing is persisted.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the session cannot be persisted, or
    /// `ApiError::Config` when a timer is needed outside a Tokio runtime.
    pub fn set_session(&self, session: Session) -> ApiResult<()> {
        let now = self.now_millis();
        let delay = session.expiration.map(|exp| {
            exp.saturating_sub(now).saturating_sub(EXPIRY_SKEW_MS)
        });

        if delay.is_some_and(|d| d <= 0) {
            debug!(account = %session.id, "session arrived already expired");
            self.inner.state.lock().session = Some(session);
            self.inner.expire(None);
            return Ok(());
        }

        let runtime = match delay {
            Some(_) => Some(tokio::runtime::Handle::try_current().map_err(|_| {
                ApiError::Config("session expiry timer requires a Tokio runtime".to_string())
            })?),
            None => None,
        };

        let serialized = serde_json::to_string(&session)?;
        self.inner.storage.set(&self.inner.key, &serialized)?;

        let mut state = self.inner.state.lock();
        let generation = state.bump();
        if let (Some(delay), Some(runtime)) = (delay, runtime) {
            let weak = Arc::downgrade(&self.inner);
            state.timer = Some(runtime.spawn(run_expiry_timer(weak, generation, delay)));
            debug!(account = %session.id, delay_ms = delay, "expiry timer armed");
        }

        info!(account = %session.id, uses_token = session.uses_token, "session installed");
        state.session = Some(session);
        Ok(())
    }

    /// The active bearer token.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.inner.state.lock().session.as_ref().map(|s| s.token.clone())
    }

    /// A copy of the active session.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.state.lock().session.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    /// Whether the local clock considers the active session expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = self.now_millis();
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.expires_within(now, EXPIRY_SKEW_MS))
    }

    /// Whether an expiry timer is currently armed.
    #[must_use]
    pub fn has_pending_timer(&self) -> bool {
        self.inner.state.lock().timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancels the timer, erases the persisted copy and returns to anonymous.
    /// No event is raised.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the persisted copy cannot be erased; the
    /// in-memory session is cleared regardless.
    pub fn clear(&self) -> ApiResult<Option<Session>> {
        let previous = {
            let mut state = self.inner.state.lock();
            state.bump();
            state.session.take()
        };
        self.inner.storage.remove(&self.inner.key)?;
        debug!("session cleared");
        Ok(previous)
    }

    /// Forces expired-session handling now.
    pub fn expire(&self) {
        self.inner.expire(None);
    }
}

async fn run_expiry_timer(inner: Weak<Inner>, generation: u64, delay_ms: i64) {
    let mut remaining = delay_ms;
    loop {
        let step = remaining.min(MAX_TIMER_DELAY_MS);
        tokio::time::sleep(Duration::from_millis(step.unsigned_abs())).await;
        remaining -= step;
        if remaining > 0 {
            debug!(remaining_ms = remaining, "re-arming clamped expiry timer");
            continue;
        }
        if let Some(inner) = inner.upgrade() {
            inner.expire(Some(generation));
        }
        return;
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.inner.key)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
