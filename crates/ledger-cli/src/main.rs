mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_core::{ChainConfig, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: f64,
    },
    /// Mine the pending transactions into a new block
    Mine {
        /// Address credited with the mining reward
        #[arg(long)]
        miner: String,
    },
    /// Cancel the block currently being mined
    Cancel,
    /// Show the balance of an address
    Balance { address: String },
    /// Show every address with its balance
    Balances,
    /// List every address seen on the chain
    Addresses,
    /// List blocks
    Chain {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show transactions waiting for the next block
    Pending,
    /// Check chain links and block contents
    Validate,
    /// Show or change difficulty and mining reward
    Config {
        #[arg(long)]
        difficulty: Option<usize>,
        #[arg(long)]
        reward: Option<f64>,
    },
    /// Run a local session without a node
    Demo {
        #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: usize,
        #[arg(long, default_value_t = DEFAULT_MINING_REWARD)]
        reward: f64,
    },
}

#[derive(Serialize)]
struct Tx {
    from: String,
    to: String,
    amount: f64,
}

#[derive(Serialize)]
struct Mine {
    miner: String,
}

#[derive(Serialize)]
struct ConfigUpdate {
    difficulty: Option<usize>,
    mining_reward: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let request = match cli.cmd {
        Command::Submit { from, to, amount } => client
            .post(format!("{node}/tx"))
            .json(&Tx { from, to, amount }),
        Command::Mine { miner } => client.post(format!("{node}/mine")).json(&Mine { miner }),
        Command::Cancel => client.post(format!("{node}/mine/cancel")),
        Command::Balance { address } => client.get(format!("{node}/balance/{address}")),
        Command::Balances => client.get(format!("{node}/balances")),
        Command::Addresses => client.get(format!("{node}/addresses")),
        Command::Chain { from, limit } => {
            let mut query = Vec::new();
            if let Some(from) = from {
                query.push(("from", from.to_string()));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            client.get(format!("{node}/chain")).query(&query)
        }
        Command::Pending => client.get(format!("{node}/pending")),
        Command::Validate => client.get(format!("{node}/chain/valid")),
        Command::Config { difficulty, reward } => {
            if difficulty.is_none() && reward.is_none() {
                client.get(format!("{node}/config"))
            } else {
                client.put(format!("{node}/config")).json(&ConfigUpdate {
                    difficulty,
                    mining_reward: reward,
                })
            }
        }
        Command::Demo { difficulty, reward } => {
            let config = ChainConfig::new(difficulty, reward)?;
            return demo::run(&mut std::io::stdout().lock(), config);
        }
    };

    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
