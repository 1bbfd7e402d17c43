use chrono::Utc;
use log::{debug, info, warn};

use super::view::balance_of;
use super::{Block, ChainView, LedgerView};
use crate::config::{GenesisConfig, LedgerConfig};
use crate::error::{BlockError, LedgerError, Result};
use crate::transaction::Transaction;
use crate::wallet::{Address, KeyPair};

/// An unmined candidate block bound to the chain head it extends.
#[derive(Debug, Clone)]
pub struct MiningTemplate {
    /// Reward transaction first, then the pending pool at snapshot time.
    pub block: Block,
    /// Difficulty in force when the template was taken.
    pub difficulty: u32,
    /// How many pending transactions the block packages.
    pub included: usize,
}

/// In-memory chain with a pending pool, Proof-of-Work and retargeting.
#[derive(Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: u32,
    config: LedgerConfig,
    genesis: GenesisConfig,
    mint_key: Option<KeyPair>,
}

impl Ledger {
    /// Initialize a ledger whose genesis block issues
    /// `genesis.initial_issuance` to the holder.
    pub fn new(config: LedgerConfig, genesis: GenesisConfig) -> Result<Self> {
        config.validate()?;
        if genesis.mint_address.is_empty() {
            return Err(LedgerError::Config("mint address must not be empty".into()));
        }

        let issuance = Transaction::new(
            genesis.mint_address.clone(),
            genesis.holder_address.clone(),
            genesis.initial_issuance,
            0,
        );
        let difficulty = config.clamp(config.difficulty);
        let ledger = Self {
            chain: vec![Block::now(vec![issuance])],
            pending: Vec::new(),
            difficulty,
            config,
            genesis,
            mint_key: None,
        };
        info!(
            "genesis {} issues {} to {}",
            ledger.chain[0].hash, ledger.genesis.initial_issuance, ledger.genesis.holder_address
        );
        Ok(ledger)
    }

    /// Sign reward transactions with `key`, which must own the mint address.
    pub fn with_mint_key(mut self, key: KeyPair) -> Result<Self> {
        if key.address() != self.genesis.mint_address {
            return Err(LedgerError::InvalidSigner(self.genesis.mint_address.to_string()));
        }
        self.mint_key = Some(key);
        Ok(self)
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn genesis(&self) -> &GenesisConfig {
        &self.genesis
    }

    /// Balance derived from every block; the mint goes negative.
    pub fn balance(&self, address: &Address) -> i128 {
        balance_of(&self.chain, address)
    }

    /// Balance minus what the sender already committed in the pending pool.
    pub fn balance_with_pending(&self, address: &Address) -> i128 {
        let reserved: u128 = self
            .pending
            .iter()
            .filter(|tx| &tx.from == address)
            .map(Transaction::outflow)
            .sum();
        self.balance(address) - reserved as i128
    }

    /// Validate `tx` and queue it for the next block.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<()> {
        if tx.is_mint(&self.genesis.mint_address) {
            warn!("rejected mint-sourced submission to {}", tx.to);
            return Err(LedgerError::ReservedSender);
        }
        if let Err(e) = tx.validate(&*self) {
            warn!("rejected tx {}: {}", tx.txid(), e);
            return Err(e);
        }

        let available = self.balance_with_pending(&tx.from);
        let required = tx.outflow();
        if available < required as i128 {
            warn!(
                "rejected tx {}: pending spends leave {} of {} required",
                tx.txid(),
                available,
                required
            );
            return Err(LedgerError::InsufficientBalance {
                address: tx.from.to_string(),
                balance: available,
                required,
            });
        }

        debug!(
            "tx {} accepted into pool (size: {} -> {})",
            tx.txid(),
            self.pending.len(),
            self.pending.len() + 1
        );
        self.pending.push(tx);
        Ok(())
    }

    /// Package the pending pool behind a reward transaction paying
    /// `reward + Σ gas` to `reward_address`. Returns `None` for an empty pool.
    pub fn prepare_template(&self, reward_address: &Address) -> Result<Option<MiningTemplate>> {
        if self.pending.is_empty() {
            debug!("pool empty, nothing to mine");
            return Ok(None);
        }
        reward_address.public_key()?;

        let gas = self
            .pending
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.gas))
            .ok_or(BlockError::RewardOverflow)?;
        let amount = self
            .config
            .reward
            .checked_add(gas)
            .ok_or(BlockError::RewardOverflow)?;

        let mut reward_tx = Transaction::new(
            self.genesis.mint_address.clone(),
            reward_address.clone(),
            amount,
            0,
        );
        if let Some(key) = &self.mint_key {
            reward_tx.sign(key)?;
        }

        let mut data = Vec::with_capacity(1 + self.pending.len());
        data.push(reward_tx);
        data.extend(self.pending.iter().cloned());

        let mut block = Block::now(data);
        block.prev_hash = self.last_block()?.hash.clone();
        block.refresh_hash();

        Ok(Some(MiningTemplate {
            block,
            difficulty: self.difficulty,
            included: self.pending.len(),
        }))
    }

    /// Append a mined template if it still extends the head. Included
    /// transactions leave the pool; later arrivals stay queued.
    pub fn commit_template(&mut self, template: MiningTemplate) -> Result<&Block> {
        let MiningTemplate {
            block, included, ..
        } = template;

        if block.prev_hash != self.last_block()?.hash {
            warn!("stale template for {}: head moved", block.prev_hash);
            return Err(LedgerError::StaleTemplate);
        }
        if block.hash != block.compute_hash() {
            return Err(BlockError::HashMismatch.into());
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(BlockError::InsufficientWork(self.difficulty).into());
        }
        block.validate_transactions(&*self)?;

        let included = included.min(self.pending.len());
        self.pending.drain(..included);
        self.append(block)
    }

    /// Mine the pending pool into a new block paid to `reward_address`.
    /// With an empty pool no block is created and `None` is returned.
    pub fn mine_transactions(&mut self, reward_address: &Address) -> Result<Option<&Block>> {
        let Some(mut template) = self.prepare_template(reward_address)? else {
            return Ok(None);
        };
        let attempts = template.block.mine(template.difficulty);
        debug!(
            "found nonce {} after {} attempts at difficulty {}",
            template.block.nonce, attempts, template.difficulty
        );
        self.commit_template(template).map(Some)
    }

    /// Link, validate, mine and append `block`, then clear the pool.
    pub fn add_block(&mut self, mut block: Block) -> Result<&Block> {
        block.prev_hash = self.last_block()?.hash.clone();
        block.refresh_hash();
        block.validate_transactions(&*self)?;

        let attempts = block.mine(self.difficulty);
        debug!("found nonce {} after {} attempts", block.nonce, attempts);

        self.pending.clear();
        self.append(block)
    }

    /// Publish a sealed block and retarget difficulty against the time
    /// elapsed since the block before it.
    fn append(&mut self, block: Block) -> Result<&Block> {
        let prev_timestamp = self.last_block()?.timestamp;
        let elapsed = Utc::now().timestamp_millis() - prev_timestamp;

        self.chain.push(block);

        let old = self.difficulty;
        self.difficulty = next_difficulty(old, elapsed, &self.config);
        debug!(
            "retarget: {} ms since previous block (target {}), difficulty {} -> {}",
            elapsed, self.config.block_time_ms, old, self.difficulty
        );

        let sealed = self.last_block()?;
        info!(
            "sealed block #{} (hash={}, nonce={}, txs={})",
            self.chain.len() - 1,
            sealed.hash,
            sealed.nonce,
            sealed.data.len()
        );
        Ok(sealed)
    }

    /// Validate this ledger's chain.
    pub fn validate(&self) -> Result<()> {
        self.validate_blocks(&self.chain)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate a sequence of blocks under this ledger's mint and reward
    /// policy: hash integrity, linkage, and each block's transactions
    /// against the blocks before it. Reports the first failing index.
    pub fn validate_blocks(&self, blocks: &[Block]) -> Result<()> {
        let genesis = blocks.first().ok_or(LedgerError::EmptyChain)?;
        if genesis.hash != genesis.compute_hash() {
            return Err(LedgerError::ChainInvalid {
                index: 0,
                reason: BlockError::HashMismatch,
            });
        }

        for index in 1..blocks.len() {
            let (prefix, rest) = blocks.split_at(index);
            let current = &rest[0];
            let prev = &prefix[index - 1];
            let fail = |reason| LedgerError::ChainInvalid { index, reason };

            if current.hash != current.compute_hash() {
                return Err(fail(BlockError::HashMismatch));
            }
            if current.prev_hash != prev.hash {
                return Err(fail(BlockError::BrokenLink));
            }
            let view = ChainView::new(prefix, &self.genesis.mint_address, self.config.reward);
            current.validate_transactions(&view).map_err(fail)?;
        }
        Ok(())
    }
}

impl LedgerView for Ledger {
    fn mint_address(&self) -> &Address {
        &self.genesis.mint_address
    }

    fn reward(&self) -> u64 {
        self.config.reward
    }

    fn balance(&self, address: &Address) -> i128 {
        Ledger::balance(self, address)
    }
}

/// Retarget rule: one step harder if the block came faster than
/// `block_time_ms`, one step easier otherwise, clamped to the bounds.
pub fn next_difficulty(current: u32, elapsed_ms: i64, config: &LedgerConfig) -> u32 {
    let next = if elapsed_ms < config.block_time_ms {
        current.saturating_add(1)
    } else {
        current.saturating_sub(1)
    };
    config.clamp(next)
}
