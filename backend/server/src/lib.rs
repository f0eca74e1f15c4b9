//! Backend of a campus mess platform: students vote once per meal per day,
//! admins can reset the day.
//!
//!
//!
//! # Daily Vote Ledger
//!
//! **Goal**: one vote per user per meal per day, with the day rolling over at
//! local midnight and no scheduled job doing it.
//!
//! - Every request resolves today's key (`YYYY-MM-DD`) in the reference zone, see [`day`]
//! - The first request of a day provisions that day's ledger with empty meal sets, see [`ledger`]
//! - Votes and resets are single atomic operations on the store, see [`database`]
//! - Yesterday's ledger stays untouched, it is just no longer today's key
//!
//!
//!
//! # Identity
//!
//! Login and registration live with the identity provider. This server only
//! verifies the signed token it issues and reads `{id, role, rollNo}` out of it,
//! see [`auth`].
//!
//!
//!
//! # Configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `RUST_PORT` | `5000` |
//! | `LEDGER_STORE` | `redis` (or `memory`) |
//! | `REDIS_URL` | `redis://redis:6379` |
//! | `DAY_KEY_TIMEZONE` | `Asia/Kolkata` |
//! | `CORS_ORIGINS` | `http://127.0.0.1:5500,http://localhost:5500` |
//! | `AUTH_TOKEN_SECRET` | Docker secret, or env var fallback |
//!
//! Logging follows `RUST_LOG`.
//! ```sh
//! RUST_LOG=info,mess_server=debug cargo run -p mess
//! ```
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run without Redis.
//! ```sh
//! LEDGER_STORE=memory AUTH_TOKEN_SECRET=dev cargo run -p mess
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{CONTENT_TYPE, RETRY_AFTER},
    },
    routing::{delete, get},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod day;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod routes;
pub mod state;
pub mod votes;

use auth::AUTH_HEADER;
use config::Config;
use routes::{health_handler, reset_handler, status_handler, vote_handler};
use state::State;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");
    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn app(state: Arc<State>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!("Ignoring invalid CORS origin {origin:?}"))
                .ok()
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(AUTH_HEADER)])
        .expose_headers([RETRY_AFTER])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(health_handler))
        .route("/api/votes", get(status_handler).post(vote_handler))
        .route("/api/votes/reset", delete(reset_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
