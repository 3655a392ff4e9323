use clap::Parser;
use log::info;
use match_server::{MatchConfig, Server};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Port the match listens on, chosen by the lobby
    port: u16,
    /// Room this match belongs to
    room_id: u64,
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Lobby address that receives the result report
    #[clap(short, long)]
    lobby: Option<String>,
    /// Simulation ticks per second
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Milliseconds between snapshots
    #[clap(long, default_value = "100")]
    snapshot_ms: u64,
    /// Milliseconds between the start announcement and the first tick
    #[clap(long, default_value = "1000")]
    start_delay_ms: u64,
    /// Seconds without input before a seat loses (0 disables)
    #[clap(long, default_value = "120")]
    idle_timeout_secs: u64,
    /// Fixed piece seed, random when omitted
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = MatchConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        room_id: args.room_id,
        lobby_addr: args.lobby,
        tick_duration: MatchConfig::tick_from_rate(args.tick_rate),
        snapshot_interval: Duration::from_millis(args.snapshot_ms),
        start_delay: Duration::from_millis(args.start_delay_ms),
        idle_timeout: MatchConfig::idle_from_secs(args.idle_timeout_secs),
        seed: args.seed,
        ..MatchConfig::default()
    };

    let server = Server::bind(config).await?;

    tokio::select! {
        outcome = server.run() => {
            info!("Match finished, winner {:?}", outcome.winner_user_id);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
