//! Biletado reservations: CLI server
//!
//! Headless reservations API suitable for a container or systemd unit.
//!
//! ```sh
//! # Run with default config (~/.config/biletado-reservations/config.toml)
//! reservations-service
//!
//! # Custom config path
//! reservations-service --config /etc/biletado/reservations.toml
//!
//! # Override the listen port
//! reservations-service --port 8080
//!
//! # Validate config without starting
//! reservations-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use biletado_reservations::config::AppConfig;
use biletado_reservations::server::{init_tracing, ServerHandle, ServerOptions};

/// Biletado reservations: room bookings with overlap protection.
#[derive(Parser, Debug)]
#[command(
    name = "reservations-service",
    version,
    about = "Room reservation service with overlap validation",
    long_about = "Biletado reservations REST API: create, update, soft-delete, \
                  restore and permanently delete room reservations.\n\n\
                  Default config: ~/.config/biletado-reservations/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "RESERVATIONS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ──────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(biletado_reservations::default_config_path);

    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // ── Apply CLI overrides ─────────────────────────────────────
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);

    match &load_error {
        None => info!("Configuration loaded from {}", config_path.display()),
        Some(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
        }
    }
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }

    // ── Config validation mode ──────────────────────────────────
    if cli.check {
        if let Some(e) = load_error {
            return Err(e.into());
        }
        println!("✅ Configuration is valid");
        println!("   Config file    : {}", config_path.display());
        println!("   API address    : {}", config.server.address());
        println!(
            "   Database       : {}",
            biletado_reservations::infrastructure::database::redact_url(
                &config.database.connection_url()
            )
        );
        println!("   Log level      : {}", config.logging.level);
        println!("   Missing update : {:?}", config.reservations.missing_update);
        return Ok(());
    }

    // ── Start server ────────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
