use thiserror::Error;

/// Why a transaction was refused at construction or submission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("sender address must not be empty")]
    EmptySender,
    #[error("recipient address must not be empty")]
    EmptyRecipient,
    #[error("amount must be a positive number, got {0}")]
    NonPositiveAmount(f64),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("blockchain is not initialized")]
    Uninitialized,

    #[error("miner address must not be empty")]
    MissingMinerAddress,

    #[error("no pending transactions to mine")]
    NothingToMine,

    #[error("mining of block {index} was cancelled at nonce {nonce}")]
    Cancelled { index: u64, nonce: u64 },

    #[error("block {index} no longer extends the tip: {reason}")]
    StaleBlock { index: u64, reason: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// First defect found by a full content check of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block has previous hash {0:?}, expected \"0\"")]
    BadGenesis(String),
    #[error("block {index} stores a hash that does not match its content")]
    HashMismatch { index: u64 },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
