pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const DEFAULT_DIFFICULTY: usize = 2;
pub const DEFAULT_MINING_REWARD: f64 = 100.0;
/// Nonce attempts between two yield/cancel checkpoints.
pub const YIELD_EVERY: u64 = 1_000;
pub const GENESIS_ADDRESS: &str = "Genesis";
pub const SYSTEM_ADDRESS: &str = "System";
pub const GENESIS_PREVIOUS_HASH: &str = "0";
