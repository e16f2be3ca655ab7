use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::YIELD_EVERY;
use crate::error::{LedgerError, Result};
use crate::Block;

/// Shared stop flag checked at every mining checkpoint.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mines `block` on the current async task, handing control back to the
/// scheduler every [`YIELD_EVERY`] attempts.
///
/// Yielding does not change which nonces are tried, so the result equals
/// [`Block::mine`] on the same input.
pub async fn mine_cooperative(
    mut block: Block,
    difficulty: usize,
    cancel: &CancelToken,
) -> Result<Block> {
    block.hash = block.compute_hash();
    loop {
        if block.mine_step(difficulty, YIELD_EVERY) {
            log_mined(&block);
            return Ok(block);
        }
        check_cancelled(&block, cancel)?;
        tokio::task::yield_now().await;
    }
}

/// Blocking search with a cancellation check every [`YIELD_EVERY`]
/// attempts.
pub fn mine_interruptible(
    mut block: Block,
    difficulty: usize,
    cancel: &CancelToken,
) -> Result<Block> {
    block.hash = block.compute_hash();
    while !block.mine_step(difficulty, YIELD_EVERY) {
        check_cancelled(&block, cancel)?;
    }
    log_mined(&block);
    Ok(block)
}

/// Runs [`mine_interruptible`] on tokio's blocking pool. The join handle
/// resolves once a hash is found or `cancel` fires.
pub fn spawn_mining(
    block: Block,
    difficulty: usize,
    cancel: CancelToken,
) -> JoinHandle<Result<Block>> {
    tokio::task::spawn_blocking(move || mine_interruptible(block, difficulty, &cancel))
}

fn check_cancelled(block: &Block, cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        warn!("mining of block {} cancelled at nonce {}", block.index, block.nonce);
        return Err(LedgerError::Cancelled {
            index: block.index,
            nonce: block.nonce,
        });
    }
    Ok(())
}

fn log_mined(block: &Block) {
    info!(
        "Mined block {} with nonce {} and hash {}",
        block.index, block.nonce, block.hash
    );
}
