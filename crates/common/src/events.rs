//! Listener registry for session and error notifications
//!
//! The store, the retry engine and the client share one [`SessionEvents`]
//! through an `Arc`. Listeners are plain callbacks invoked synchronously on
//! the thread that raised the event.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::ApiError;

type Listener = Arc<dyn Fn() + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Registered `onSignedOut`, `onSessionExpired` and `onError` callbacks.
#[derive(Default)]
pub struct SessionEvents {
    signed_out: RwLock<Vec<Listener>>,
    session_expired: RwLock<Vec<Listener>>,
    error: RwLock<Vec<ErrorListener>>,
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after a voluntary sign-out.
    pub fn on_signed_out<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.signed_out.write().push(Arc::new(listener));
    }

    /// Called once when a session is cleared because it expired.
    pub fn on_session_expired<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.session_expired.write().push(Arc::new(listener));
    }

    /// Called with every failure that is about to be surfaced to a caller.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.error.write().push(Arc::new(listener));
    }

    /// Whether at least one error listener is registered.
    #[must_use]
    pub fn has_error_listener(&self) -> bool {
        !self.error.read().is_empty()
    }

    pub fn emit_signed_out(&self) {
        debug!("emitting signed-out event");
        // Snapshot so a listener can register further listeners without deadlocking.
        let listeners = self.signed_out.read().clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn emit_session_expired(&self) {
        debug!("emitting session-expired event");
        let listeners = self.session_expired.read().clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn emit_error(&self, error: &ApiError) {
        let listeners = self.error.read().clone();
        for listener in listeners {
            listener(error);
        }
    }
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents")
            .field("signed_out", &self.signed_out.read().len())
            .field("session_expired", &self.session_expired.read().len())
            .field("error", &self.error.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn listeners_receive_their_own_events() {
        let events = SessionEvents::new();
        let signed_out = Arc::new(AtomicUsize::new(0));
        let expired = Arc::new(AtomicUsize::new(0));

        let counter = signed_out.clone();
        events.on_signed_out(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = expired.clone();
        events.on_session_expired(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit_session_expired();
        assert_eq!(signed_out.load(Ordering::SeqCst), 0);
        assert_eq!(expired.load(Ordering::SeqCst), 1);

        events.emit_signed_out();
        assert_eq!(signed_out.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_listener_sees_error() {
        let events = SessionEvents::new();
        assert!(!events.has_error_listener());

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.on_error(move |err| sink.lock().push(err.to_string()));

        assert!(events.has_error_listener());
        events.emit_error(&ApiError::AntiForgeryMismatch);
        assert_eq!(seen.lock().as_slice(), ["anti-forgery state mismatch in redirect"]);
    }
}
