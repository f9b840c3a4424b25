//! Per-browser web session state and its process-wide store.
//!
//! A [`WebSession`] holds everything the bridge needs to rebuild a backend
//! connection after the proxy serving it died: the stable backend-session
//! id, cached credentials, and the last visited room. It is created empty on
//! a browser's first request and fully cleared on logout.
//!
//! [`SessionStore`] maps the cookie-carried token to sessions. Entries are
//! handed out as `Arc<Mutex<_>>` — a handler holds the session lock for the
//! whole request, so concurrent tabs mutate cached fields in a defined
//! order. A periodic sweep drops sessions that have been idle longer than
//! the configured TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Cached per-browser state. All field writes after creation happen through
/// the session bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSession {
    /// Stable identifier naming this browser's backend session and its proxy
    /// endpoint. Generated once, unchanged until teardown.
    pub backend_session_id: Option<String>,
    /// Whether the backend currently considers this session logged in.
    pub authenticated: bool,
    pub username: Option<String>,
    /// Cached only so a rebuilt connection can be logged back in.
    pub password: Option<String>,
    /// Last successfully entered room.
    pub room: Option<String>,
    /// Cached backend display identity, fetched at most once per session.
    pub server_name: Option<String>,
}

impl WebSession {
    /// Reset to the empty/initial state (logout).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

struct StoreEntry {
    session: Arc<Mutex<WebSession>>,
    last_seen: Instant,
}

/// Cookie-token-keyed store of web sessions.
///
/// Cloneable — all clones share the same inner map.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<RwLock<HashMap<String, StoreEntry>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Look up the session for a cookie token, creating a fresh one (with a
    /// fresh token) when the token is absent or unknown. Returns the token
    /// to set, the session entry, and whether it was newly created.
    pub async fn resolve(&self, token: Option<&str>) -> (String, Arc<Mutex<WebSession>>, bool) {
        let mut entries = self.entries.write().await;

        if let Some(token) = token {
            if let Some(entry) = entries.get_mut(token) {
                entry.last_seen = Instant::now();
                return (token.to_string(), Arc::clone(&entry.session), false);
            }
        }

        let token = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(WebSession::default()));
        entries.insert(
            token.clone(),
            StoreEntry {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        info!("web session created, total: {}", entries.len());
        (token, session, true)
    }

    /// Drop sessions idle longer than the TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_seen.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            info!("expired {removed} web session(s), remaining: {}", entries.len());
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.entries.read().await.len()
    }
}
