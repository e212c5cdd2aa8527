use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use window_stats_server::api;
use window_stats_server::config::Config;
use window_stats_server::db::StatsData;
use window_stats_server::stats_handler::StatsHandler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_args()?;
    info!("Starting window-stats service");
    info!("TCP ingest: {}", config.tcp_address);
    info!("HTTP server: {}", config.http_address);

    let stats = Arc::new(StatsData::open(&config.storage).await?);

    let tcp_listener = TcpListener::bind(&config.tcp_address).await?;
    info!("TCP ingest listening on {}", config.tcp_address);

    let http_address = config.http_address.clone();
    let stats_for_http = stats.clone();
    tokio::spawn(async move {
        if let Err(e) = api::run_http_server(http_address, stats_for_http).await {
            error!("HTTP server error: {}", e);
        }
    });

    loop {
        match tcp_listener.accept().await {
            Ok((stream, addr)) => {
                info!("New producer connection from {}", addr);
                let stats_clone = stats.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_producer_connection(stream, addr, stats_clone).await {
                        error!("Error handling producer connection from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Read newline-delimited measurements from one producer.
///
/// Lines are applied strictly in the order they arrive, so a producer that
/// sends all measurements of a subject over one connection gets them merged
/// one at a time and in submission order.
async fn handle_producer_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    stats: Arc<StatsData>,
) -> Result<(), std::io::Error> {
    let handler = StatsHandler::new(stats);
    let mut buffer = vec![0u8; 8192];
    let mut leftover = Vec::new();

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            info!("Producer connection from {} closed", addr);
            break;
        }

        leftover.extend_from_slice(&buffer[..n]);

        while let Some(newline_pos) = leftover.iter().position(|&b| b == b'\n') {
            let line = &leftover[..newline_pos];

            if !line.is_empty() {
                if let Err(e) = handler.handle_message(line).await {
                    error!("Error processing message from {}: {}", addr, e);
                }
            }

            leftover.drain(..=newline_pos);
        }
    }

    Ok(())
}
