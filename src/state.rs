//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bridge::endpoint::{
    resolve_proxy_binary, ProcessLauncher, UnixConnector,
};
use crate::bridge::{BridgeTiming, SessionBridge};
use crate::config::Config;
use crate::protocol::ClientIdentity;
use crate::websession::SessionStore;

/// The production bridge: Unix-socket endpoints, proxies spawned as
/// `parlor-proxy` processes.
pub type ProxyBridge = SessionBridge<UnixConnector, ProcessLauncher>;

/// Shared application state for the parlor server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Cookie-token-keyed web session store.
    pub store: SessionStore,
    /// Bridges web sessions to their backend connections.
    pub bridge: Arc<ProxyBridge>,
}

impl AppState {
    /// Wire up the store and bridge from configuration.
    pub fn new(config: Config) -> Self {
        let store = SessionStore::new(Duration::from_secs(config.server.session_ttl_secs));

        let launcher = ProcessLauncher {
            binary: resolve_proxy_binary(&config.proxy.binary),
            backend_addr: config.backend.addr.clone(),
            idle_timeout_secs: config.proxy.idle_timeout_secs,
        };
        let timing = BridgeTiming {
            connect_timeout: Duration::from_millis(config.backend.connect_timeout_ms),
            spawn_wait: Duration::from_millis(config.backend.spawn_wait_ms),
            spawn_poll: Duration::from_millis(config.backend.spawn_poll_ms),
        };
        let bridge = SessionBridge::new(
            UnixConnector,
            launcher,
            config.proxy.socket_dir.clone().into(),
            timing,
            ClientIdentity::default(),
        );

        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            store,
            bridge: Arc::new(bridge),
        }
    }
}
