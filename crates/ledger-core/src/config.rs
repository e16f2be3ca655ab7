use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, HASH_HEX_SIZE};
use crate::error::{LedgerError, Result};

/// Tunables read by the chain each time a block is prepared.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Required count of leading `'0'` hex characters.
    pub difficulty: usize,
    pub mining_reward: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
        }
    }
}

impl ChainConfig {
    pub fn new(difficulty: usize, mining_reward: f64) -> Result<Self> {
        let config = Self {
            difficulty,
            mining_reward,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_difficulty(self.difficulty)?;
        validate_reward(self.mining_reward)
    }
}

pub(crate) fn validate_difficulty(difficulty: usize) -> Result<()> {
    // A digest has no more characters than this, so the search could never end.
    if difficulty > HASH_HEX_SIZE {
        return Err(LedgerError::Config(format!(
            "difficulty {difficulty} exceeds the {HASH_HEX_SIZE} hex characters of a hash"
        )));
    }
    Ok(())
}

pub(crate) fn validate_reward(reward: f64) -> Result<()> {
    if !reward.is_finite() || reward < 0.0 {
        return Err(LedgerError::Config(format!(
            "mining reward must be a non-negative number, got {reward}"
        )));
    }
    Ok(())
}
