use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Four-player pong server")]
struct Args {
    /// Address to bind the TCP listener and UDP socket to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port shared by the TCP listener and the UDP socket
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = shared::GAME_FPS)]
    tick_rate: u32,

    /// Milliseconds between state snapshots
    #[arg(short, long, default_value_t = 100)]
    sync_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!(
        "Starting server on {}:{} at {} ticks/s",
        args.host, args.port, args.tick_rate
    );

    let config = ServerConfig::new(&args.host, args.port)
        .with_tick_rate(args.tick_rate)
        .with_sync_interval(Duration::from_millis(args.sync_ms));

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", args.host, args.port, e);
            return Err(e);
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            shutdown.trigger();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
