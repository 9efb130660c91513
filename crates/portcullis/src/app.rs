//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates proxy
//! startup, the listener registry, and graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown, wait_for_signal},
};
use portcullis_event_system::{ListenerRegistry, ProfileRequestEvent, ShutdownState};
use proxy_server::{create_proxy, ProxyServer};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main application struct.
///
/// The `Application` struct manages the complete lifecycle of the proxy:
/// configuration loading, listener registration, the accept loop, and
/// graceful shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    server: Arc<ProxyServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Register the built-in listeners and freeze the registry
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        args.apply_to(&mut config);

        // Validate configuration
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let proxy_config = config.to_proxy_config()?;
        let registry = ListenerRegistry::with_config(proxy_config.events.sequencer_config());
        let server = create_proxy(proxy_config, registry)?;

        info!(
            "🧩 {} profile listener(s) registered",
            server.negotiator().sequencer().listener_count::<ProfileRequestEvent>()
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the proxy until a termination signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Portcullis");
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();

        let mut server_handle = {
            let server = self.server.clone();
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("✅ Portcullis is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            result = wait_for_shutdown(&shutdown_state) => result?,
            // Before shutdown the server only returns if it failed to start
            joined = &mut server_handle => {
                joined??;
                return Ok(());
            }
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("⏳ Waiting for in-flight negotiations to finish...");
        let grace = self.config.shutdown_grace();
        match tokio::time::timeout(grace, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => error!("❌ Server error: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", grace),
        }

        self.log_final_statistics();
        info!("✅ Portcullis shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🔐 Mode: {}",
            if self.config.authentication.online_mode {
                "online"
            } else {
                "offline"
            }
        );
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  ⏱️ Connection timeout: {}s", self.config.server.connection_timeout);
        info!("  ⏱️ Dispatch timeout: {}ms", self.config.events.dispatch_timeout_ms);
        info!(
            "  🔨 Bans: {} name(s), {} address(es)",
            self.config.security.banned_names.len(),
            self.config.security.banned_ips.len()
        );
    }

    fn log_final_statistics(&self) {
        let stats = self.server.negotiator().sequencer().stats();
        info!("📊 Final Statistics:");
        info!("  - Logins dispatched: {}", stats.events_dispatched);
        info!("  - Listener invocations: {}", stats.listeners_invoked);
        info!(
            "  - Listener failures: {} ({} timed out)",
            stats.listener_failures, stats.listener_timeouts
        );
        info!("  - Vetoes: {}", stats.vetoes);
    }
}
