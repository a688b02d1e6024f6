//! Polymorph server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address
//! polymorph-server
//!
//! # Larger key table, verbose logs
//! RUST_LOG=debug polymorph-server --bind 0.0.0.0:5000 --table-size 16
//! ```

use clap::Parser;
use polymorph_core::SessionConfig;
use polymorph_server::{DEFAULT_ADDRESS, DEFAULT_MAX_FRAME_SIZE, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Polymorph protocol server
#[derive(Parser, Debug)]
#[command(name = "polymorph-server")]
#[command(about = "Polymorph secure messaging echo server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    bind: String,

    /// Number of keys derived per session (must match the clients)
    #[arg(long, default_value_t = polymorph_core::DEFAULT_TABLE_SIZE)]
    table_size: u32,

    /// Largest accepted frame body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Polymorph server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        session: SessionConfig { table_size: args.table_size },
        max_frame_size: args.max_frame_size,
    };

    let server = Server::bind(config).await?;
    server.run().await?;

    Ok(())
}
