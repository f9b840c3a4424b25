//! # parlor
//!
//! Web front-end for line-protocol room servers.
//!
//! HTTP requests are stateless; the backend wants one persistent, ordered
//! connection per logged-in user. parlor bridges the two: each browser
//! session gets a dedicated proxy process holding its backend connection,
//! and every page handler resolves that connection through the session
//! bridge before doing anything else.
//!
//! ## Pages
//!
//! | Method | Path           | Gate       | Description                    |
//! |--------|----------------|------------|--------------------------------|
//! | GET    | `/healthz`     | public     | Liveness probe                 |
//! | GET    | `/login`       | allow-list | Login form                     |
//! | POST   | `/login`       | allow-list | Perform login                  |
//! | GET    | `/logout`      | allow-list | End the backend session        |
//! | GET    | `/`            | protected  | Front page                     |
//! | GET    | `/goto/{room}` | protected  | Enter a room                   |
//! | GET    | `/who`         | protected  | Who is online                  |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, router setup, sweep task, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! state.rs         — shared AppState
//! protocol/        — backend line-protocol client (replies, typed commands)
//! proxy/           — per-session proxy logic (also built as parlor-proxy)
//! bridge/          — session bridge: resolution, replay, gate, teardown
//! websession/      — cookie-keyed WebSession store with TTL sweep
//! routes/          — page handlers
//! ```

use axum::{
    routing::get,
    Router,
};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;

use parlor::config::Config;
use parlor::routes;
use parlor::state::AppState;

/// Web front-end for line-protocol room servers.
#[derive(Parser)]
#[command(name = "parlor", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("parlor v{} starting", env!("CARGO_PKG_VERSION"));
    info!("backend at {}", config.backend.addr);
    info!("listening on {}", config.server.listen);

    // The rendezvous directory must exist before the first proxy spawn.
    if let Err(e) = std::fs::create_dir_all(&config.proxy.socket_dir) {
        eprintln!(
            "failed to create socket dir {}: {e}",
            config.proxy.socket_dir
        );
        std::process::exit(1);
    }

    let state = AppState::new(config);

    let app = Router::new()
        .route("/healthz", get(routes::health::healthz))
        .route(
            "/login",
            get(routes::login::login_form).post(routes::login::perform_login),
        )
        .route("/logout", get(routes::login::logout))
        .route("/", get(routes::pages::front))
        .route("/goto/{room}", get(routes::pages::goto_room))
        .route("/who", get(routes::pages::who))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    // Periodic sweep: drop web sessions idle past their TTL. Their proxies
    // exit on their own idle timers.
    let store = state.store.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            store.sweep().await;
        }
    });

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Shutting down...");
    sweep_task.abort();
    info!("Goodbye");
}
