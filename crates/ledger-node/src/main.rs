mod api;
mod constants;

use clap::Parser;
use ledger_core::{Blockchain, ChainConfig, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};
use std::net::SocketAddr;
use tracing::{info, Level};

use crate::api::{router, AppState};
use crate::constants::DEFAULT_LISTEN;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Leading zero hex characters required in a block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Amount paid to the miner of each block
    #[arg(long, default_value_t = DEFAULT_MINING_REWARD)]
    reward: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ChainConfig::new(args.difficulty, args.reward)?;

    let mut ledger = Blockchain::new(config);
    let ledger = tokio::task::spawn_blocking(move || {
        ledger.initialize();
        ledger
    })
    .await?;

    let app = router(AppState::new(ledger));

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
