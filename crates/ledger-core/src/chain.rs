use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::{validate_difficulty, validate_reward, ChainConfig};
use crate::constants::{GENESIS_ADDRESS, GENESIS_PREVIOUS_HASH, SYSTEM_ADDRESS};
use crate::error::{IntegrityError, LedgerError, Result};
use crate::{pow, Block, Transaction};

/// A block assembled from the pending queue that still has to be mined.
///
/// Building a template does not touch the chain: the reward transaction only
/// exists inside `block` until [`Blockchain::commit_block`] accepts it, so a
/// reader of the pending queue during mining sees the queue as submitted.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub block: Block,
    difficulty: usize,
    taken: usize,
    rewarded: bool,
}

impl BlockTemplate {
    /// Difficulty in force when the template was built. The commit checks
    /// the block against this value.
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Count of pending transactions the block consumes (reward excluded).
    pub fn taken(&self) -> usize {
        self.taken
    }
}

/// Single linear chain plus the queue of transactions waiting for a block.
///
/// Starts uninitialized; [`Blockchain::initialize`] mines the genesis block.
#[derive(Clone, Debug, Default)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    config: ChainConfig,
}

impl Blockchain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            chain: Vec::new(),
            pending_transactions: Vec::new(),
            config,
        }
    }

    /// Mines and appends the genesis block. Idempotent.
    pub fn initialize(&mut self) -> &Block {
        if self.chain.is_empty() {
            let mut genesis = genesis_block();
            genesis.mine(self.config.difficulty);
            info!("genesis block created with hash {}", genesis.hash);
            self.chain.push(genesis);
        }
        &self.chain[0]
    }

    pub fn is_initialized(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.ensure_initialized()?;
        if let Err(err) = tx.validate() {
            warn!("rejected transaction {} -> {}: {err}", tx.from(), tx.to());
            return Err(err.into());
        }
        debug!("queued transaction {} -> {}: {}", tx.from(), tx.to(), tx.amount());
        self.pending_transactions.push(tx);
        Ok(())
    }

    /// Builds and queues a transaction in one step.
    pub fn submit(&mut self, from: &str, to: &str, amount: f64) -> Result<()> {
        self.ensure_initialized()?;
        let tx = Transaction::new(from, to, amount).inspect_err(|err| {
            warn!("rejected transaction {from} -> {to}: {err}");
        })?;
        self.add_transaction(tx)
    }

    /// Packs every pending transaction plus a reward for `miner` into a new
    /// block, mines it on the calling thread and appends it.
    pub fn mine_pending_transactions(&mut self, miner: &str) -> Result<&Block> {
        let mut template = self.prepare_block(miner)?;
        template.block.mine(template.difficulty);
        self.commit_block(template)
    }

    /// Snapshots the pending queue into an unmined block on top of the tip.
    pub fn prepare_block(&self, miner: &str) -> Result<BlockTemplate> {
        let tip = self.latest_block().ok_or(LedgerError::Uninitialized)?;
        if miner.is_empty() {
            return Err(LedgerError::MissingMinerAddress);
        }
        if self.pending_transactions.is_empty() {
            return Err(LedgerError::NothingToMine);
        }

        let mut transactions = self.pending_transactions.clone();
        // Only genesis may carry a zero amount, so a zero reward is not paid out.
        let rewarded = self.config.mining_reward > 0.0;
        if rewarded {
            transactions.push(Transaction::reward(miner, self.config.mining_reward));
        }
        let block = Block::new(self.chain.len() as u64, transactions, tip.hash.clone());
        Ok(BlockTemplate {
            block,
            difficulty: self.config.difficulty,
            taken: self.pending_transactions.len(),
            rewarded,
        })
    }

    /// Appends a mined template and drops the transactions it consumed.
    ///
    /// Fails without changing anything if the block no longer extends the
    /// tip, was not mined to its difficulty, or does not carry the queued
    /// transactions it was built from.
    pub fn commit_block(&mut self, template: BlockTemplate) -> Result<&Block> {
        let BlockTemplate {
            block,
            difficulty,
            taken,
            rewarded,
        } = template;
        let stale = |reason| LedgerError::StaleBlock {
            index: block.index,
            reason,
        };

        let tip = self.latest_block().ok_or(LedgerError::Uninitialized)?;
        if block.index != self.chain.len() as u64 {
            return Err(stale("index is not the next height"));
        }
        if block.previous_hash != tip.hash {
            return Err(stale("previous hash is not the tip hash"));
        }
        if block.hash != block.compute_hash() || !pow::meets_difficulty(&block.hash, difficulty) {
            return Err(stale("block is not mined"));
        }
        let queued = self.pending_transactions.get(..taken);
        let carried = block.transactions.get(..taken);
        let expected_len = taken + usize::from(rewarded);
        if block.transactions.len() != expected_len || queued.is_none() || queued != carried {
            return Err(stale("transactions differ from the pending queue"));
        }

        self.pending_transactions.drain(..taken);
        info!(
            "appended block {} ({} transactions, nonce {})",
            block.index,
            block.transactions.len(),
            block.nonce
        );
        self.chain.push(block);
        Ok(&self.chain[self.chain.len() - 1])
    }

    /// Net amount received minus amount sent, over the whole chain.
    pub fn get_balance(&self, address: &str) -> f64 {
        self.transactions().fold(0.0, |balance, tx| {
            let mut balance = balance;
            if tx.from() == address {
                balance -= tx.amount();
            }
            if tx.to() == address {
                balance += tx.amount();
            }
            balance
        })
    }

    /// Every participant seen on the chain, in order of first appearance.
    ///
    /// `"Genesis"` never counts; `"System"` is skipped as a sender.
    pub fn get_all_addresses(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for tx in self.transactions() {
            let from = tx.from();
            if from != GENESIS_ADDRESS && from != SYSTEM_ADDRESS && seen.insert(from) {
                addresses.push(from.to_string());
            }
            let to = tx.to();
            if to != GENESIS_ADDRESS && seen.insert(to) {
                addresses.push(to.to_string());
            }
        }
        addresses
    }

    /// Balance of every address from [`Self::get_all_addresses`].
    pub fn balances(&self) -> Vec<(String, f64)> {
        let mut totals: HashMap<&str, f64> = HashMap::new();
        for tx in self.transactions() {
            *totals.entry(tx.from()).or_default() -= tx.amount();
            *totals.entry(tx.to()).or_default() += tx.amount();
        }
        self.get_all_addresses()
            .into_iter()
            .map(|address| {
                let balance = totals.get(address.as_str()).copied().unwrap_or_default();
                (address, balance)
            })
            .collect()
    }

    /// Checks that every block stores the hash of its predecessor.
    ///
    /// Only stored fields are compared; block content is not rehashed. A
    /// block whose transactions were rewritten after mining still passes as
    /// long as the stored hash pair is intact. Use
    /// [`Self::verify_integrity`] for a content check.
    pub fn is_chain_valid(&self) -> bool {
        self.chain
            .windows(2)
            .all(|pair| pair[1].previous_hash == pair[0].hash)
    }

    /// Rehashes every block and checks every link, reporting the first
    /// defect.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let genesis = self.chain.first().ok_or(IntegrityError::Empty)?;
        if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(IntegrityError::BadGenesis(genesis.previous_hash.clone()));
        }
        for (i, block) in self.chain.iter().enumerate() {
            if block.hash != block.compute_hash() {
                return Err(IntegrityError::HashMismatch { index: block.index });
            }
            if i > 0 && block.previous_hash != self.chain[i - 1].hash {
                return Err(IntegrityError::BrokenLink { index: block.index });
            }
        }
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Mutable access to a stored block, for tamper simulations.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.chain.get_mut(index)
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    /// Takes effect from the next prepared block.
    pub fn set_difficulty(&mut self, difficulty: usize) -> Result<()> {
        validate_difficulty(difficulty)?;
        self.config.difficulty = difficulty;
        Ok(())
    }

    /// Takes effect from the next prepared block.
    pub fn set_mining_reward(&mut self, reward: f64) -> Result<()> {
        validate_reward(reward)?;
        self.config.mining_reward = reward;
        Ok(())
    }

    pub fn set_config(&mut self, config: ChainConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.chain.iter().flat_map(|block| block.transactions.iter())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.chain.is_empty() {
            return Err(LedgerError::Uninitialized);
        }
        Ok(())
    }
}

/// Unmined block 0 holding the single zero-amount genesis transaction.
pub fn genesis_block() -> Block {
    Block::new(0, vec![Transaction::genesis()], GENESIS_PREVIOUS_HASH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn initialized(difficulty: usize, reward: f64) -> Blockchain {
        let mut chain = Blockchain::new(ChainConfig::new(difficulty, reward).unwrap());
        chain.initialize();
        chain
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_genesis());
        assert!(genesis.hash.is_empty());
    }

    #[test]
    fn initialize_mines_genesis_once() {
        let mut chain = Blockchain::new(ChainConfig::default());
        assert!(!chain.is_initialized());
        let first = chain.initialize().hash.clone();
        assert!(first.starts_with("00"));
        let second = chain.initialize().hash.clone();
        assert_eq!(first, second);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn operations_before_initialize_fail() {
        let mut chain = Blockchain::default();
        let tx = Transaction::new("Alice", "Bob", 1.0).unwrap();
        assert!(matches!(chain.add_transaction(tx), Err(LedgerError::Uninitialized)));
        assert!(matches!(
            chain.mine_pending_transactions("Miner1"),
            Err(LedgerError::Uninitialized)
        ));
        assert!(chain.is_chain_valid());
        assert_eq!(chain.verify_integrity(), Err(IntegrityError::Empty));
        assert_eq!(chain.get_balance("Alice"), 0.0);
    }

    #[test]
    fn mining_preconditions_are_explicit() {
        let mut chain = initialized(1, 10.0);
        assert!(matches!(
            chain.mine_pending_transactions("Miner1"),
            Err(LedgerError::NothingToMine)
        ));
        chain.submit("Alice", "Bob", 1.0).unwrap();
        assert!(matches!(
            chain.mine_pending_transactions(""),
            Err(LedgerError::MissingMinerAddress)
        ));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending_transactions().len(), 1);
    }

    #[test]
    fn submit_validates_input() {
        let mut chain = initialized(0, 10.0);
        assert!(matches!(
            chain.submit("", "Bob", 10.0),
            Err(LedgerError::Validation(ValidationError::EmptySender))
        ));
        assert!(matches!(
            chain.submit("Alice", "Bob", 0.0),
            Err(LedgerError::Validation(ValidationError::NonPositiveAmount(_)))
        ));
        assert!(chain.pending_transactions().is_empty());
        chain.submit("Alice", "Bob", 10.0).unwrap();
        assert_eq!(chain.pending_transactions().len(), 1);
    }

    #[test]
    fn mined_block_links_to_tip_and_clears_queue() {
        let mut chain = initialized(2, 100.0);
        chain.submit("Alice", "Bob", 50.0).unwrap();
        let tip = chain.latest_block().unwrap().hash.clone();
        let block = chain.mine_pending_transactions("Miner1").unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, tip);
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.transactions.len(), 2);
        assert!(block.transactions[1].is_reward());
        assert!(chain.pending_transactions().is_empty());
    }

    #[test]
    fn template_leaves_queue_untouched() {
        let mut chain = initialized(1, 5.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();
        let template = chain.prepare_block("Miner1").unwrap();
        assert_eq!(template.taken(), 1);
        assert_eq!(template.block.transactions.len(), 2);
        assert_eq!(chain.pending_transactions().len(), 1);
        assert!(!chain.pending_transactions()[0].is_reward());
    }

    #[test]
    fn commit_keeps_transactions_submitted_during_mining() {
        let mut chain = initialized(1, 5.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();
        let mut template = chain.prepare_block("Miner1").unwrap();
        chain.submit("Carol", "Dave", 1.0).unwrap();
        template.block.mine(template.difficulty());
        chain.commit_block(template).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.pending_transactions().len(), 1);
        assert_eq!(chain.pending_transactions()[0].from(), "Carol");
    }

    #[test]
    fn commit_rejects_unmined_and_stale_blocks() {
        let mut chain = initialized(1, 5.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();

        let unmined = chain.prepare_block("Miner1").unwrap();
        assert!(matches!(
            chain.commit_block(unmined),
            Err(LedgerError::StaleBlock { .. })
        ));

        let mut first = chain.prepare_block("Miner1").unwrap();
        let mut second = chain.prepare_block("Miner2").unwrap();
        first.block.mine(first.difficulty());
        second.block.mine(second.difficulty());
        chain.commit_block(first).unwrap();
        assert!(matches!(
            chain.commit_block(second),
            Err(LedgerError::StaleBlock { index: 1, .. })
        ));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn commit_rejects_substituted_transactions() {
        let mut chain = initialized(1, 5.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();
        let mut template = chain.prepare_block("Miner1").unwrap();
        template.block.transactions[0] = Transaction::new("Alice", "Mallory", 3.0).unwrap();
        template.block.mine(template.difficulty());
        assert!(chain.commit_block(template).is_err());
        assert_eq!(chain.pending_transactions().len(), 1);
    }

    #[test]
    fn config_changes_apply_to_next_block() {
        let mut chain = initialized(1, 10.0);
        chain.set_difficulty(3).unwrap();
        chain.set_mining_reward(25.0).unwrap();
        assert!(chain.set_difficulty(65).is_err());
        assert!(chain.set_mining_reward(-1.0).is_err());
        assert_eq!(chain.difficulty(), 3);

        chain.submit("Alice", "Bob", 1.0).unwrap();
        let block = chain.mine_pending_transactions("Miner1").unwrap();
        assert!(block.hash.starts_with("000"));
        assert_eq!(chain.get_balance("Miner1"), 25.0);
    }

    #[test]
    fn addresses_skip_reserved_senders() {
        let mut chain = initialized(0, 10.0);
        chain.submit("Alice", "Bob", 5.0).unwrap();
        chain.submit("Bob", "Alice", 1.0).unwrap();
        chain.mine_pending_transactions("Miner1").unwrap();
        chain.submit("Carol", "System", 1.0).unwrap();
        chain.mine_pending_transactions("Alice").unwrap();

        let addresses = chain.get_all_addresses();
        assert_eq!(addresses, vec!["Alice", "Bob", "Miner1", "Carol", "System"]);
        assert!(!addresses.iter().any(|a| a == "Genesis"));
    }

    #[test]
    fn balances_follow_address_order() {
        let mut chain = initialized(0, 10.0);
        chain.submit("Alice", "Bob", 5.0).unwrap();
        chain.mine_pending_transactions("Miner1").unwrap();
        assert_eq!(
            chain.balances(),
            vec![
                ("Alice".to_string(), -5.0),
                ("Bob".to_string(), 5.0),
                ("Miner1".to_string(), 10.0),
            ]
        );
    }

    #[test]
    fn commit_checks_the_chain_difficulty() {
        let mut chain = initialized(3, 5.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();
        let mut template = chain.prepare_block("Miner1").unwrap();
        assert_eq!(template.difficulty(), 3);

        template.block.mine(0);
        while pow::meets_difficulty(&template.block.hash, 3) {
            template.block.nonce += 1;
            template.block.hash = template.block.compute_hash();
        }
        assert!(matches!(
            chain.commit_block(template),
            Err(LedgerError::StaleBlock { index: 1, .. })
        ));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending_transactions().len(), 1);
    }

    #[test]
    fn zero_reward_adds_no_reward_transaction() {
        let mut chain = initialized(1, 0.0);
        chain.submit("Alice", "Bob", 3.0).unwrap();
        let block = chain.mine_pending_transactions("Miner1").unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert!(!block.transactions.iter().any(|tx| tx.is_reward()));
        assert_eq!(chain.get_balance("System"), 0.0);
        assert_eq!(chain.get_all_addresses(), vec!["Alice", "Bob"]);
        assert!(chain.pending_transactions().is_empty());
    }

    #[test]
    fn tampered_amount_keeps_links_valid() {
        let mut chain = initialized(1, 100.0);
        chain.submit("Alice", "Bob", 50.0).unwrap();
        chain.mine_pending_transactions("Miner1").unwrap();
        chain.submit("Bob", "Carol", 10.0).unwrap();
        chain.mine_pending_transactions("Miner2").unwrap();

        let forged = Transaction::new("Alice", "Bob", 1000.0).unwrap();
        chain.block_mut(1).unwrap().transactions[0] = forged;

        assert!(chain.is_chain_valid());
        assert_eq!(chain.get_balance("Bob"), 990.0);
        assert_eq!(
            chain.verify_integrity(),
            Err(IntegrityError::HashMismatch { index: 1 })
        );
    }

    #[test]
    fn broken_link_is_detected() {
        let mut chain = initialized(1, 100.0);
        chain.submit("Alice", "Bob", 50.0).unwrap();
        chain.mine_pending_transactions("Miner1").unwrap();
        chain.submit("Bob", "Carol", 10.0).unwrap();
        chain.mine_pending_transactions("Miner2").unwrap();
        assert_eq!(chain.verify_integrity(), Ok(()));

        chain.block_mut(2).unwrap().previous_hash = "00deadbeef".into();
        assert!(!chain.is_chain_valid());
        assert!(chain.verify_integrity().is_err());
    }

    #[test]
    fn rehashed_tamper_breaks_next_link() {
        let mut chain = initialized(1, 100.0);
        chain.submit("Alice", "Bob", 50.0).unwrap();
        chain.mine_pending_transactions("Miner1").unwrap();
        chain.submit("Bob", "Carol", 10.0).unwrap();
        chain.mine_pending_transactions("Miner2").unwrap();

        let block = chain.block_mut(1).unwrap();
        block.transactions[0] = Transaction::new("Alice", "Bob", 1000.0).unwrap();
        block.mine(1);

        assert!(!chain.is_chain_valid());
        assert_eq!(
            chain.verify_integrity(),
            Err(IntegrityError::BrokenLink { index: 2 })
        );
    }
}
