use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::{DEFAULT_PORT, DEFAULT_ROOM_CAPACITY};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "1000")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = ServerConfig {
        max_clients: args.max_clients,
        room_capacity: DEFAULT_ROOM_CAPACITY,
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
    };

    let address = format!("{}:{}", args.host, args.port);
    info!(
        "Starting server on {} at {}Hz, max {} clients",
        address, tick_rate, config.max_clients
    );

    let mut server = match Server::bind(&address, config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    server.run().await;

    Ok(())
}
