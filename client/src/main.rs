use clap::Parser;
use client::game::{play, Bot};
use client::network::{Connection, LobbyApi};
use log::{error, info};
use shared::{MAX_PLAYERS, MIN_PLAYERS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL
    #[arg(short = 's', long, env = "FUNFACTS_SERVER", default_value = "http://127.0.0.1:3001")]
    server: String,

    /// Lobby code to join (a new lobby is created when omitted)
    #[arg(short = 'c', long)]
    code: Option<String>,

    /// Number of bots to run in this process
    #[arg(short = 'b', long, default_value_t = MIN_PLAYERS)]
    bots: usize,

    /// Name prefix for the bots
    #[arg(short = 'n', long, default_value = "Bot")]
    name: String,

    /// Seed for the bots' answers
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let bots = args.bots.clamp(1, MAX_PLAYERS);
    let api = LobbyApi::new(&args.server);

    let code = match args.code {
        Some(code) => code.trim().to_uppercase(),
        None => api.create_lobby().await?,
    };
    if api.lobby_status(&code).await?.is_none() {
        error!("Lobby {} does not exist", code);
        return Err(format!("lobby {} not found", code).into());
    }

    info!("Running {} bots in lobby {}", bots, code);

    let mut handles = Vec::new();
    for i in 0..bots {
        let server = args.server.clone();
        let mut bot = Bot::new(
            &code,
            &format!("{} {}", args.name, i + 1),
            &format!("{}-{}", args.name.to_lowercase(), i + 1),
            args.seed + i as u64,
        )
        .with_start_at(bots);

        handles.push(tokio::spawn(async move {
            let mut conn = Connection::connect(&server).await?;
            let view = play(&mut conn, &mut bot).await?;
            conn.close().await?;
            Ok::<_, client::network::ClientError>(view)
        }));
    }

    for handle in handles {
        match handle.await? {
            Ok(view) => {
                info!(
                    "Final score {} over rounds {:?}",
                    view.total_score, view.round_scores
                );
            }
            Err(e) => error!("Bot failed: {}", e),
        }
    }

    Ok(())
}
