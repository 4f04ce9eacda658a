//! regmirror Server Binary
//!
//! Starts the persistent Modbus TCP register server.

use std::time::Duration;

use clap::Parser;
use regmirror::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// regmirror server
#[derive(Parser, Debug)]
#[command(name = "regmirror-server")]
#[command(about = "Persistent Modbus TCP register server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:1502")]
    listen: String,

    /// Backing SQLite database
    #[arg(short, long, default_value = "./regmirror.db")]
    db: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "32")]
    max_connections: usize,

    /// Modbus unit id to answer for
    #[arg(short, long, default_value = "1")]
    unit_id: u8,

    /// First coil address
    #[arg(long, default_value = "0")]
    coil_start: u16,

    /// Number of coils
    #[arg(long, default_value = "100")]
    coil_count: u16,

    /// First discrete input address
    #[arg(long, default_value = "0")]
    discrete_start: u16,

    /// Number of discrete inputs
    #[arg(long, default_value = "100")]
    discrete_count: u16,

    /// First input register address
    #[arg(long, default_value = "0")]
    input_start: u16,

    /// Number of input registers
    #[arg(long, default_value = "100")]
    input_count: u16,

    /// First holding register address
    #[arg(long, default_value = "0")]
    holding_start: u16,

    /// Number of holding registers
    #[arg(long, default_value = "100")]
    holding_count: u16,

    /// Seconds between counter report lines
    #[arg(long, default_value = "60")]
    report_interval: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,regmirror=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("regmirror server v{}", regmirror::VERSION);
    tracing::info!("listen address: {}", args.listen);
    tracing::info!("backing store: {}", args.db);

    // Build config from args
    let config = Config::builder()
        .listen_addr(&args.listen)
        .db_path(&args.db)
        .max_connections(args.max_connections)
        .unit_id(args.unit_id)
        .coils(args.coil_start, args.coil_count)
        .discrete_inputs(args.discrete_start, args.discrete_count)
        .input_registers(args.input_start, args.input_count)
        .holding_registers(args.holding_start, args.holding_count)
        .report_interval(Duration::from_secs(args.report_interval))
        .build();

    // Open engine
    let engine = match Engine::open(config).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to start engine: {e}");
            std::process::exit(1);
        }
    };

    // Ctrl+C asks the engine to stop; the loop releases everything on the
    // way out
    let handle = engine.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                handle.stop();
            }
            Err(e) => tracing::warn!("failed to install ctrl-c handler: {e}"),
        }
    });

    if let Err(e) = engine.run().await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}
