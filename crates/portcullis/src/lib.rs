//! # Portcullis Login Proxy - Main Entry Point
//!
//! Verifies the identity behind every inbound login, lets configured listeners
//! rewrite or refuse the resulting profile, and hands finalized connections
//! on. This entry point handles CLI parsing, configuration loading, and
//! application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! portcullis
//!
//! # Specify custom configuration
//! portcullis --config production.toml
//!
//! # Override specific settings
//! portcullis --bind 0.0.0.0:25577 --log-level debug --offline
//!
//! # JSON logging for production
//! portcullis --json-logs
//! ```
//!
//! ## Configuration
//!
//! The proxy loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The proxy handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the proxy from the process arguments.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut logging_config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    args.apply_to(&mut logging_config);

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&logging_config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{AuthenticationSettings, EventSettings, LoggingSettings, SecuritySettings, ServerSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_application_creation() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            bind_address: Some("127.0.0.1:0".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: false,
            offline: true,
        };

        let app = Application::new(args.clone()).await.unwrap();
        assert!(args.config_path.exists());
        assert_eq!(app.config().server.bind_address, "127.0.0.1:0");
        assert!(!app.config().authentication.online_mode);
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_overrides() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            bind_address: Some("nowhere".to_string()),
            ..CliArgs::default()
        };

        let error = Application::new(args).await.err().unwrap();
        assert!(error.to_string().contains("Configuration validation failed"));
    }
}
