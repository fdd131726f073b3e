use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, MAX_CONNECTIONS};
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, env = "FUNFACTS_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "FUNFACTS_PORT", default_value = "3001")]
    port: u16,

    /// Directory of prompt category files (built-in prompts when omitted)
    #[arg(long, env = "FUNFACTS_PROMPTS_DIR")]
    prompts_dir: Option<PathBuf>,

    /// Directory for persisted sessions (in-memory when omitted)
    #[arg(long, env = "FUNFACTS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Hours of inactivity before a lobby expires
    #[arg(long, env = "FUNFACTS_SESSION_TTL_HOURS", default_value = "24")]
    session_ttl_hours: u64,

    /// Seconds between sweeps for expired lobbies
    #[arg(
        long,
        env = "FUNFACTS_SWEEP_INTERVAL_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,

    /// Maximum simultaneous WebSocket connections
    #[arg(long, env = "FUNFACTS_MAX_CONNECTIONS", default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,

    /// Seed for prompt and code generation
    #[arg(long, env = "FUNFACTS_SEED")]
    seed: Option<u64>,

    /// Allowed CORS origin, may be repeated (any origin when omitted)
    #[arg(long = "cors-origin", env = "FUNFACTS_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            prompts_dir: args.prompts_dir,
            data_dir: args.data_dir,
            session_ttl: Duration::from_secs(args.session_ttl_hours.saturating_mul(60 * 60)),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            max_connections: args.max_connections,
            seed: args.seed,
            cors_origins: args.cors_origins,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!("Starting lobby server...");

    let server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
