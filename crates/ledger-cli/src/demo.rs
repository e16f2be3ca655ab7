use std::io::Write;

use anyhow::{Context, Result};
use ledger_core::{Blockchain, ChainConfig, Transaction};
use tracing::info;

/// Runs the reference session in-process: two mined blocks, balances,
/// validation, then a tampered amount.
pub fn run(out: &mut impl Write, config: ChainConfig) -> Result<()> {
    let mut chain = Blockchain::new(config);
    chain.initialize();
    info!("demo chain initialized at difficulty {}", config.difficulty);

    chain.add_transaction(Transaction::new("Alice", "Bob", 50.0)?)?;
    chain.add_transaction(Transaction::new("Bob", "Charlie", 25.0)?)?;
    writeln!(out, "Mining block with pending transactions...")?;
    chain.mine_pending_transactions("Miner1")?;

    chain.add_transaction(Transaction::new("Charlie", "Alice", 10.0)?)?;
    chain.add_transaction(Transaction::new("Alice", "Bob", 5.0)?)?;
    writeln!(out, "Mining second block...")?;
    chain.mine_pending_transactions("Miner2")?;

    print_chain(out, &chain)?;

    writeln!(out, "\nBALANCES:")?;
    for (address, balance) in chain.balances() {
        writeln!(out, "{address}: {balance}")?;
    }

    writeln!(out, "\nIs blockchain valid? {}", chain.is_chain_valid())?;

    writeln!(out, "\nAttempting to modify a block...")?;
    let block = chain.block_mut(1).context("block 1 was mined above")?;
    block.transactions[0] = Transaction::new("Alice", "Bob", 1000.0)?;

    writeln!(
        out,
        "Is blockchain valid after modification? {}",
        chain.is_chain_valid()
    )?;
    match chain.verify_integrity() {
        Ok(()) => writeln!(out, "Full integrity check: ok")?,
        Err(err) => writeln!(out, "Full integrity check: {err}")?,
    }
    Ok(())
}

pub fn print_chain(out: &mut impl Write, chain: &Blockchain) -> Result<()> {
    writeln!(out, "\n=== BLOCKCHAIN ===")?;
    for block in chain.blocks() {
        writeln!(out, "{block}")?;
        writeln!(out, "Transactions:")?;
        for tx in &block.transactions {
            writeln!(out, "  {} -> {}: {}", tx.from(), tx.to(), tx.amount())?;
        }
        writeln!(out, "{}", "-".repeat(50))?;
    }
    Ok(())
}
