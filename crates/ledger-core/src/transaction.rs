use serde::Serialize;

use crate::constants::{GENESIS_ADDRESS, SYSTEM_ADDRESS};
use crate::error::ValidationError;
use crate::unix_now;

/// A value transfer between two addresses.
///
/// Only [`Transaction::new`] builds user transactions, and it refuses invalid
/// input, so every value of this type outside the crate is well formed. The
/// reward and genesis transactions are built by the chain itself.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transaction {
    from: String,
    to: String,
    amount: f64,
    timestamp: u64,
}

impl Transaction {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
    ) -> Result<Self, ValidationError> {
        let tx = Self {
            from: from.into(),
            to: to.into(),
            amount,
            timestamp: unix_now(),
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Money creation paid to the miner of a block.
    pub(crate) fn reward(miner: impl Into<String>, amount: f64) -> Self {
        Self {
            from: SYSTEM_ADDRESS.to_string(),
            to: miner.into(),
            amount,
            timestamp: unix_now(),
        }
    }

    /// Zero-amount placeholder carried by block 0.
    pub(crate) fn genesis() -> Self {
        Self {
            from: GENESIS_ADDRESS.to_string(),
            to: GENESIS_ADDRESS.to_string(),
            amount: 0.0,
            timestamp: unix_now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if self.to.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        // NaN fails this comparison as well.
        if !(self.amount > 0.0 && self.amount.is_finite()) {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_reward(&self) -> bool {
        self.from == SYSTEM_ADDRESS
    }

    pub fn is_genesis(&self) -> bool {
        self.from == GENESIS_ADDRESS
    }

    /// Appends this transaction's canonical encoding to a block's hash input.
    pub(crate) fn write_hash_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.from.len() as u64).to_le_bytes());
        out.extend_from_slice(self.from.as_bytes());
        out.extend_from_slice(&(self.to.len() as u64).to_le_bytes());
        out.extend_from_slice(self.to.as_bytes());
        out.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
    }

    #[cfg(test)]
    pub(crate) fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}
