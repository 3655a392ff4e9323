use clap::Parser;
use lobby::gateway::{Gateway, MemoryGateway, RemoteGateway};
use lobby::launcher::ProcessLauncher;
use lobby::{LobbyConfig, LobbyServer};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Address to bind to, overrides the config file
    #[clap(short, long)]
    bind: Option<String>,
    /// Host advertised to clients and match processes
    #[clap(long)]
    public_host: Option<String>,
    /// Persistence service address
    #[clap(short, long)]
    gateway: Option<String>,
    /// First port handed to match processes
    #[clap(long)]
    port_start: Option<u16>,
    /// End (exclusive) of the match port range
    #[clap(long)]
    port_end: Option<u16>,
    /// Keep accounts and reports in memory instead of using a persistence service
    #[clap(long)]
    memory_gateway: bool,
}

impl Args {
    fn into_config(self) -> Result<(LobbyConfig, bool), lobby::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => LobbyConfig::load(path)?,
            None => LobbyConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(host) = self.public_host {
            config.public_host = host;
        }
        if let Some(gateway) = self.gateway {
            config.gateway_addr = gateway;
        }
        if let Some(start) = self.port_start {
            config.port_range.start = start;
        }
        if let Some(end) = self.port_end {
            config.port_range.end = end;
        }
        Ok((config, self.memory_gateway))
    }
}

async fn serve<G: Gateway>(config: LobbyConfig, gateway: G) -> Result<(), Box<dyn std::error::Error>> {
    let server = LobbyServer::bind(config, gateway, ProcessLauncher).await?;
    if let Err(e) = server.lobby().init().await {
        warn!("Could not reset persistence state: {}", e);
    }

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, memory_gateway) = Args::parse().into_config()?;
    info!(
        "Match ports {}..{}, launching {}",
        config.port_range.start, config.port_range.end, config.launch.program
    );

    if memory_gateway {
        info!("Using in-memory persistence");
        serve(config, MemoryGateway::new()).await
    } else {
        let gateway = RemoteGateway::new(config.gateway_addr.clone(), config.gateway_timeout());
        serve(config, gateway).await
    }
}
