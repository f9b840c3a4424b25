//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `PARLOR_LISTEN`, `PARLOR_BACKEND_ADDR`,
//!    `PARLOR_SOCKET_DIR`
//! 2. **Config file** — path via `--config <path>`, or `parlor.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! session_ttl_secs = 1800
//!
//! [backend]
//! addr = "127.0.0.1:504"
//! connect_timeout_ms = 5000
//! spawn_wait_ms = 3000
//! spawn_poll_ms = 250
//!
//! [proxy]
//! binary = ""               # empty = resolve next to the server binary
//! socket_dir = "/tmp/parlor"
//! idle_timeout_secs = 900
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Web sessions idle longer than this are dropped (default 1800).
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

/// Backend connection settings, shared by the bridge and the spawned proxies.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend address as `host:port` (default `127.0.0.1:504`).
    #[serde(default = "default_backend_addr")]
    pub addr: String,
    /// Per-attempt endpoint/backend connect timeout (default 5000 ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total time to wait for a freshly spawned proxy (default 3000 ms).
    #[serde(default = "default_spawn_wait_ms")]
    pub spawn_wait_ms: u64,
    /// Interval between connect attempts while waiting (default 250 ms).
    #[serde(default = "default_spawn_poll_ms")]
    pub spawn_poll_ms: u64,
}

/// Session proxy process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Path to the `parlor-proxy` binary. Empty means: look next to the
    /// server executable, then fall back to `$PATH`.
    #[serde(default)]
    pub binary: String,
    /// Directory for per-session rendezvous sockets (default `/tmp/parlor`).
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,
    /// Proxies exit after this long with no connected client (default 900).
    #[serde(default = "default_proxy_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_session_ttl_secs() -> u64 {
    1800
}
fn default_backend_addr() -> String {
    "127.0.0.1:504".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_spawn_wait_ms() -> u64 {
    3000
}
fn default_spawn_poll_ms() -> u64 {
    250
}
fn default_socket_dir() -> String {
    "/tmp/parlor".to_string()
}
fn default_proxy_idle_timeout_secs() -> u64 {
    900
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: default_backend_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
            spawn_wait_ms: default_spawn_wait_ms(),
            spawn_poll_ms: default_spawn_poll_ms(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: String::new(),
            socket_dir: default_socket_dir(),
            idle_timeout_secs: default_proxy_idle_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise
    /// looks for `parlor.toml` in the current directory, falling back to
    /// compiled defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config: Config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("parlor.toml").exists() {
            let content =
                std::fs::read_to_string("parlor.toml").expect("Failed to read parlor.toml");
            toml::from_str(&content).expect("Failed to parse parlor.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                backend: BackendConfig::default(),
                proxy: ProxyConfig::default(),
                logging: LoggingConfig::default(),
            }
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("PARLOR_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(addr) = std::env::var("PARLOR_BACKEND_ADDR") {
            config.backend.addr = addr;
        }
        if let Ok(dir) = std::env::var("PARLOR_SOCKET_DIR") {
            config.proxy.socket_dir = dir;
        }

        config
    }
}
