//! Cryptonite - URL classification host for the browser extension.
//!
//! Runs the local bridge server the extension shell talks to, backed by a
//! SQLite property store and the remote classification service.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use cryptonite_core::EngineConfig;
use cryptonite_server::{Server, ServerConfig, DEFAULT_EXTENSION_ORIGIN, DEFAULT_HOST, DEFAULT_PORT};
use cryptonite_storage::Database;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Config file looked up in the data directory when `--config` is not given.
const CONFIG_FILE_NAME: &str = "config.json";

/// Cryptonite - URL classification host for the browser extension
#[derive(Parser, Debug)]
#[command(name = "cryptonite", version, about)]
struct Args {
    /// Path to a JSON engine config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (default: platform data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Host to bind the bridge server to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind the bridge server to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Extension base URL used to resolve extension pages
    #[arg(long, default_value = DEFAULT_EXTENSION_ORIGIN)]
    extension_origin: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "metacert", "cryptonite")
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cryptonite={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("cryptonite")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Loads the engine config.
///
/// An explicit path must load. The default file in the data directory is
/// optional and falls back to the bundled config if it cannot be read.
fn load_config(explicit: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match explicit {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => match data_dir.map(|dir| dir.join(CONFIG_FILE_NAME)) {
            Some(path) if path.exists() => EngineConfig::load(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                EngineConfig::default()
            }),
            _ => EngineConfig::default(),
        },
    };

    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Cryptonite...");
    tracing::debug!("Args: {:?}", args);

    let data_dir = project_dirs().map(|dirs| dirs.data_dir().to_path_buf());
    let engine_config = load_config(args.config.as_deref(), data_dir.as_deref())?;

    let db = match args.db_path {
        Some(ref path) => Database::with_path(path),
        None => Database::new(),
    }
    .map_err(|e| anyhow::anyhow!("Database error: {}", e))?;

    let server_config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        db_path: args.db_path.clone(),
        extension_origin: args.extension_origin.clone(),
    };

    let server = Server::with_database(server_config, engine_config, db)
        .context("failed to create bridge server")?;
    tracing::info!("Bridge listening on {}", server.addr());

    tokio::select! {
        result = server.run() => result.context("bridge server stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
    }

    tracing::info!("Cryptonite shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["cryptonite"]);
        assert_eq!(args.host, DEFAULT_HOST);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.log_level, "info");
        assert!(!args.debug);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "cryptonite",
            "--config",
            "/tmp/c.json",
            "--db-path",
            "/tmp/c.db",
            "--port",
            "9001",
            "--debug",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(args.db_path, Some(PathBuf::from("/tmp/c.db")));
        assert_eq!(args.port, 9001);
        assert!(args.debug);
    }

    #[test]
    fn test_explicit_config_must_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_config(Some(&missing), None).is_err());
    }

    #[test]
    fn test_default_config_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, Some(dir.path())).unwrap();
        assert_eq!(config.max_history_items, EngineConfig::default().max_history_items);

        let mut file = std::fs::File::create(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        file.write_all(b"not json").unwrap();
        let config = load_config(None, Some(dir.path())).unwrap();
        assert_eq!(config.trial_days, EngineConfig::default().trial_days);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, r#"{"trial_days": 14}"#).unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.trial_days, 14);
    }
}
