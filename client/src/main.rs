use clap::Parser;
use client::network::{Client, ClientConfig};
use log::{info, warn};
use shared::{AsyncWorker, Message, PolarSpeed};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "9582")]
    port: u16,

    /// Display name of the player
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Seconds between keep-alive pings
    #[arg(long, default_value = "0.5")]
    ping_interval: f32,

    /// Fraction of max speed to steer with once connected, 0 to 1
    #[arg(short, long)]
    magnitude: Option<f32>,

    /// Heading in radians to steer with once connected
    #[arg(short, long, default_value = "0")]
    angle: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let steering = match args.magnitude {
        Some(magnitude) => Some(PolarSpeed::new(magnitude, args.angle)?),
        None => None,
    };

    let config = ClientConfig {
        host: args.host,
        port: args.port,
        name: args.name,
        ping_interval: Duration::try_from_secs_f32(args.ping_interval)?,
    };

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut client = Client::new(config, tx);
    client.start();
    client.wait_started().await?;

    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else { break };

                match message {
                    Message::Connected { bacteria_id, world_size, total_nutrient, .. } => {
                        info!(
                            "Playing as bacteria {} in a {} world with {} nutrient",
                            bacteria_id, world_size, total_nutrient
                        );
                        if let Some(speed) = steering {
                            client.change_speed(speed);
                        }
                    }
                    Message::GameStatusUpdate { snapshot } => {
                        let own = client.player_id().and_then(|id| snapshot.bacteria_by_id(id));
                        match own {
                            Some(bacteria) => info!(
                                "At ({:.2}, {:.2}), radius {:.2}; {} bacterias and {} organisms in view",
                                bacteria.position.x,
                                bacteria.position.y,
                                bacteria.radius,
                                snapshot.bacterias.len(),
                                snapshot.organisms.len()
                            ),
                            None => warn!("Own bacteria missing from update"),
                        }
                    }
                    other => warn!("Unexpected {:?} message from server", other.kind()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    client.stop();
    client.join().await;

    Ok(())
}
