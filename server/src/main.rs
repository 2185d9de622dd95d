use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::AsyncWorker;
use std::time::Duration;

/// Command line arguments for the server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[clap(short, long, default_value = "9582")]
    port: u16,

    /// Edge length of the square world
    #[clap(short, long, default_value = "200")]
    size: f32,

    /// Total nutrient kept in the world
    #[clap(short, long, default_value = "90")]
    livestock: f32,

    /// Seconds of silence before a client stops receiving updates
    #[clap(short, long, default_value = "2")]
    expiration: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        world_size: args.size,
        total_nutrient: args.livestock,
        client_expiration: Duration::try_from_secs_f32(args.expiration)?,
    };

    info!("Starting server on {}", config.bind_addr());
    info!(
        "World size: {}, total nutrient: {}, client expiration: {:?}",
        config.world_size, config.total_nutrient, config.client_expiration
    );

    let mut server = Server::new(config);
    server.start();
    server.wait_started().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    server.stop();
    server.join().await;

    Ok(())
}
