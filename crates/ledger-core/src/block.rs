use chrono::DateTime;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

use crate::{pow, unix_now, Transaction};

#[derive(Clone, Debug, Serialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    /// Hex digest at `nonce`. Empty until the block is mined.
    pub hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp: unix_now(),
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Canonical hash input. The nonce is always the trailing 8 bytes.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let capacity = 64 + self.transactions.len() * 64 + self.previous_hash.len();
        let mut bytes = Vec::with_capacity(capacity);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            tx.write_hash_bytes(&mut bytes);
        }
        bytes.extend_from_slice(&(self.previous_hash.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn compute_hash(&self) -> String {
        digest_hex(&self.hash_bytes())
    }

    /// Runs the nonce search to completion and returns the winning hash.
    ///
    /// There is no attempt limit: at difficulty `d` the expected cost is
    /// `16^d` hashes.
    pub fn mine(&mut self, difficulty: usize) -> &str {
        self.hash = self.compute_hash();
        while !self.mine_step(difficulty, u64::MAX) {}
        info!(
            "Mined block {} with nonce {} and hash {}",
            self.index,
            self.nonce,
            self.hash
        );
        &self.hash
    }

    /// Continues the search from the stored hash for at most `budget`
    /// nonce increments. Returns `true` once the stored hash meets
    /// `difficulty`. An unmined block first tries its current nonce.
    ///
    /// Every mining mode is built on this, so they all try the same nonces
    /// in the same order.
    pub fn mine_step(&mut self, difficulty: usize, budget: u64) -> bool {
        if self.hash.is_empty() {
            self.hash = self.compute_hash();
        }
        if pow::meets_difficulty(&self.hash, difficulty) {
            return true;
        }
        let mut bytes = self.hash_bytes();
        let nonce_at = bytes.len() - 8;
        for _ in 0..budget {
            self.nonce = self.nonce.wrapping_add(1);
            bytes[nonce_at..].copy_from_slice(&self.nonce.to_le_bytes());
            self.hash = digest_hex(&bytes);
            if pow::meets_difficulty(&self.hash, difficulty) {
                return true;
            }
        }
        false
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| self.timestamp.to_string());
        write!(
            f,
            "Block #{}\nTimestamp: {}\nPrevious Hash: {}\nHash: {}\nNonce: {}\nTransactions: {}",
            self.index,
            timestamp,
            self.previous_hash,
            self.hash,
            self.nonce,
            self.transactions.len()
        )
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
