//! Cryptonite Server - local HTTP bridge.
//!
//! The extension's JavaScript shell forwards browser events here and
//! executes the directives it gets back.
//!
//! ## Endpoints
//!
//! - `POST /api/events` - Apply a browser event, return directives
//! - `GET /api/history` - Recently verified sites
//! - `GET /api/subscription` - Trial / paid status
//! - `POST /api/subscription/refresh` - Re-run the purchase lookup
//!
//! ## Example
//!
//! ```no_run
//! use cryptonite_core::EngineConfig;
//! use cryptonite_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default(), EngineConfig::default()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use cryptonite_core::{ApiError, EngineConfig, HttpClassifier, PropertyStore};
use cryptonite_storage::{Database, SqliteStore};

pub use error::{BridgeError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48766;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default extension origin used to resolve extension-relative paths.
pub const DEFAULT_EXTENSION_ORIGIN: &str = "chrome-extension://cryptonite/";

/// How often the trial timer checks for a due expiry.
pub const TRIAL_TIMER_INTERVAL: Duration = Duration::from_secs(30);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48766).
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<PathBuf>,
    /// Extension base URL, for example `chrome-extension://<id>/`.
    pub extension_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
            extension_origin: DEFAULT_EXTENSION_ORIGIN.to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a config with a specific database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] cryptonite_storage::StorageError),

    /// Classification client could not be built.
    #[error("classification client error: {0}")]
    Client(#[from] ApiError),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the bridge router.
pub fn router(state: AppState) -> Router {
    // The extension origin is not known in advance
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/events", post(handlers::post_event))
        .route("/api/history", get(handlers::get_history))
        .route("/api/subscription", get(handlers::get_subscription))
        .route(
            "/api/subscription/refresh",
            post(handlers::refresh_subscription),
        )
        .layer(cors)
        .with_state(state)
}

/// Fires the trial expiry once its scheduled time passes.
///
/// Directives it produces are delivered with the next event response.
pub fn spawn_trial_timer(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if state.queue.take_due_trial_expiry(Utc::now()) {
                debug!("Trial expiry due");
                state.engine.lock().await.on_trial_expired();
            }
        }
    })
}

/// The HTTP bridge server.
pub struct Server {
    state: AppState,
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with a SQLite store and the HTTP classifier.
    pub fn new(config: ServerConfig, engine_config: EngineConfig) -> std::result::Result<Self, ServerError> {
        let db = match config.db_path {
            Some(ref path) => Database::with_path(path)?,
            None => Database::in_memory()?,
        };

        Self::with_database(config, engine_config, db)
    }

    /// Creates a server with an existing database.
    pub fn with_database(
        config: ServerConfig,
        engine_config: EngineConfig,
        db: Database,
    ) -> std::result::Result<Self, ServerError> {
        let api = Arc::new(HttpClassifier::new(engine_config.api.clone())?);
        let props = PropertyStore::new(Arc::new(SqliteStore::new(db)));
        let state = AppState::new(engine_config, props, api, &config.extension_origin);
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let router = router(state.clone());

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            state,
            router,
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the shared state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs the server and the trial timer until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Cryptonite bridge on {}", self.addr);

        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };

        // SO_REUSEADDR so a quick restart does not trip over TIME_WAIT sockets
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let timer = spawn_trial_timer(self.state.clone(), TRIAL_TIMER_INTERVAL);

        let result = axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()));

        timer.abort();
        result
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
