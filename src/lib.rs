#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! parlor library — web front-end machinery for line-protocol room servers.
//!
//! The building blocks:
//! - `protocol` — reply parsing and the typed backend command client
//! - `proxy` — the per-session connection proxy (backend TCP ↔ Unix socket)
//! - `bridge` — session bridge: connection resolution, state replay, access gate
//! - `websession` — cookie-keyed per-browser session state
//! - `routes` — page handlers
//! - `config` — configuration loading
//! - `state` — shared handler state

pub mod bridge;
pub mod config;
pub mod protocol;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod websession;

// Re-export key types at crate root for convenience.
pub use bridge::{BridgeConnection, BridgeTiming, Resolution, SessionBridge};
pub use config::Config;
pub use protocol::ProtocolClient;
pub use state::AppState;
pub use websession::{SessionStore, WebSession};
