//! Polymorph client binary.
//!
//! Sends each line read from stdin as one message and prints the server's
//! reply. Closes the session gracefully at end of input.
//!
//! # Usage
//!
//! ```bash
//! echo "hello there" | polymorph-client --connect 127.0.0.1:5000
//! ```

use clap::Parser;
use polymorph_core::SessionConfig;
use polymorph_server::{
    ClientConfig, DEFAULT_ADDRESS, DEFAULT_MAX_FRAME_SIZE, Received, ServerError, connect,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Polymorph protocol client
#[derive(Parser, Debug)]
#[command(name = "polymorph-client")]
#[command(about = "Polymorph secure messaging client")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    connect: String,

    /// Number of keys derived per session (must match the server)
    #[arg(long, default_value_t = polymorph_core::DEFAULT_TABLE_SIZE)]
    table_size: u32,

    /// Largest accepted frame body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = ClientConfig {
        server_address: args.connect,
        session: SessionConfig { table_size: args.table_size },
        max_frame_size: args.max_frame_size,
    };

    let mut connection = connect(&config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }

        match connection.send(line.as_bytes()).await {
            Ok(()) => {},
            Err(e) if !e.is_fatal() => {
                tracing::warn!("Message not sent: {}", e);
                continue;
            },
            Err(e) => return Err(e.into()),
        }

        match connection.recv().await? {
            Some(Received::Message(reply)) => {
                stdout.write_all(&reply).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            },
            Some(Received::Closed(reason)) => {
                tracing::info!(?reason, "server closed session");
                return Ok(());
            },
            None => {
                return Err(ServerError::Transport("server closed connection".to_string()).into());
            },
        }
    }

    let reason = connection.close().await?;
    tracing::info!(?reason, "session closed");

    Ok(())
}
