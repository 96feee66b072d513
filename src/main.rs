use clap::Parser;
use prophet_market_engine::cli::{Cli, Command, Config};
use prophet_market_engine::coordinator::Coordinator;
use prophet_market_engine::persistence;
use prophet_market_engine::state::AppState;
use prophet_market_engine::transport;
use prophet_market_engine::utils::shutdown_token;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn load_or_new(config: &Config) -> Coordinator {
    if config.snapshot_path.exists() {
        match persistence::load_state(&config.snapshot_path) {
            Ok(coordinator) => {
                tracing::info!(path = %config.snapshot_path.display(), "resumed from snapshot");
                coordinator
            }
            Err(e) => {
                tracing::error!(error = %e, path = %config.snapshot_path.display(), "failed to load snapshot, starting empty");
                Coordinator::new()
            }
        }
    } else {
        Coordinator::new()
    }
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let coordinator = load_or_new(&config);
    let state = AppState::new(coordinator, config.snapshot_path.clone(), config.trade_store_path.clone());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let shutdown = shutdown_token();
    let server_shutdown = shutdown.clone();

    transport::serve(listener, state.clone(), server_shutdown).await;

    let coordinator = state.coordinator.lock().await;
    persistence::dump_state(&coordinator, &state.snapshot_path)?;
    tracing::info!(path = %state.snapshot_path.display(), "final snapshot written on shutdown");
    Ok(())
}

async fn run_snapshot(config: Config) -> anyhow::Result<()> {
    let coordinator = load_or_new(&config);
    persistence::dump_state(&coordinator, &config.snapshot_path)?;
    println!("wrote snapshot to {}", config.snapshot_path.display());
    Ok(())
}

fn run_replay(snapshot_path: std::path::PathBuf) -> anyhow::Result<()> {
    let coordinator = persistence::load_state(&snapshot_path)?;
    let markets = coordinator.get_markets();
    println!("{} active market(s) in {}", markets.len(), snapshot_path.display());
    for m in markets {
        println!(
            "  {} ({}): best_bid={:?} best_ask={:?}",
            m.market, m.name, m.best_bid, m.best_ask
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Snapshot(config) => run_snapshot(config).await,
        Command::Replay { snapshot_path } => run_replay(snapshot_path),
    }
}
