//! Proof-of-work ledger engine: transactions, hash-linked blocks, nonce
//! search and chain validation, all held in memory by one owner.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod mine;
pub mod transaction;

use std::time::{SystemTime, UNIX_EPOCH};

pub use block::Block;
pub use chain::{BlockTemplate, Blockchain};
pub use config::ChainConfig;
pub use constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};
pub use error::{IntegrityError, LedgerError, Result, ValidationError};
pub use mine::CancelToken;
pub use transaction::Transaction;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub mod pow {
    /// True when the first `difficulty` characters of `hash` are all `'0'`.
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        leading_zero_chars(hash) >= difficulty
    }

    pub fn leading_zero_chars(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    /// Expected number of hashes to satisfy `difficulty`.
    pub fn expected_attempts(difficulty: usize) -> f64 {
        16f64.powi(difficulty as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_chars_examples() {
        assert_eq!(pow::leading_zero_chars(""), 0);
        assert_eq!(pow::leading_zero_chars("abc"), 0);
        assert_eq!(pow::leading_zero_chars("00f0"), 2);
        assert_eq!(pow::leading_zero_chars("0000"), 4);
    }

    #[test]
    fn difficulty_zero_accepts_anything() {
        assert!(pow::meets_difficulty("", 0));
        assert!(pow::meets_difficulty("ffff", 0));
    }

    #[test]
    fn meets_difficulty_examples() {
        assert!(pow::meets_difficulty("00ab", 2));
        assert!(pow::meets_difficulty("000b", 2));
        assert!(!pow::meets_difficulty("0a0b", 2));
        assert!(!pow::meets_difficulty("0", 2));
    }

    #[test]
    fn expected_attempts_grow_by_sixteen() {
        assert_eq!(pow::expected_attempts(0), 1.0);
        assert_eq!(pow::expected_attempts(2), 256.0);
    }

    #[test]
    fn unix_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
