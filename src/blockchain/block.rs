use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CANCEL_CHECK_INTERVAL, LedgerView};
use crate::error::{BlockError, LedgerError, Result};
use crate::hash::{meets_difficulty, sha256_hex};
use crate::transaction::Transaction;
use crate::wallet::Address;

/// A single block in the chain holding an ordered list of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: i64, // Unix timestamp in milliseconds (UTC)
    pub data: Vec<Transaction>,
    pub prev_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Cached hash of the block
}

impl Block {
    /// Create a new block (not linked, not mined). The ledger sets
    /// `prev_hash` when appending.
    pub fn new(timestamp: i64, data: Vec<Transaction>) -> Self {
        let mut block = Self {
            timestamp,
            data,
            prev_hash: String::new(),
            nonce: 0,
            hash: String::new(),
        };
        block.refresh_hash();
        block
    }

    /// Create a block stamped with the current time.
    pub fn now(data: Vec<Transaction>) -> Self {
        Self::new(Utc::now().timestamp_millis(), data)
    }

    /// SHA-256 over `prev_hash ++ timestamp ++ json(data) ++ nonce`.
    pub fn compute_hash(&self) -> String {
        let txs_json = serde_json::to_string(&self.data).expect("serialize txs");
        let preimage = format!(
            "{}{}{}{}",
            self.prev_hash, self.timestamp, txs_json, self.nonce
        );
        sha256_hex(preimage.as_bytes())
    }

    pub fn refresh_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Perform Proof-of-Work: bump the nonce until the hash has at least
    /// `difficulty` leading zeros. Returns the number of nonces tried.
    ///
    /// The current hash is checked first, so difficulty 0 returns 0.
    /// The nonce wraps to 0 after `u64::MAX`.
    pub fn mine(&mut self, difficulty: u32) -> u64 {
        let mut attempts = 0u64;
        while !self.meets_difficulty(difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            self.refresh_hash();
            attempts += 1;
        }
        attempts
    }

    /// Like [`Block::mine`], but gives up once `cancel` is set.
    pub fn mine_until(&mut self, difficulty: u32, cancel: &AtomicBool) -> Result<u64> {
        let mut attempts = 0u64;
        while !self.meets_difficulty(difficulty) {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return Err(LedgerError::MiningCancelled);
            }
            self.nonce = self.nonce.wrapping_add(1);
            self.refresh_hash();
            attempts += 1;
        }
        Ok(attempts)
    }

    /// Check the block's economics against the chain as it stood just
    /// before this block:
    /// - exactly one mint (reward) transaction;
    /// - reward equals `view.reward() + Σ gas` of the other transactions;
    /// - every transaction validates on its own;
    /// - no sender spends more in total than its pre-block balance.
    pub fn validate_transactions(
        &self,
        view: &impl LedgerView,
    ) -> std::result::Result<(), BlockError> {
        let mint = view.mint_address();

        let rewards: Vec<&Transaction> =
            self.data.iter().filter(|tx| tx.is_mint(mint)).collect();
        if rewards.len() != 1 {
            return Err(BlockError::MintCount(rewards.len()));
        }

        let gas = self
            .data
            .iter()
            .filter(|tx| !tx.is_mint(mint))
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.gas))
            .ok_or(BlockError::RewardOverflow)?;
        let expected = view
            .reward()
            .checked_add(gas)
            .ok_or(BlockError::RewardOverflow)?;
        if rewards[0].amount != expected {
            return Err(BlockError::RewardMismatch {
                expected,
                actual: rewards[0].amount,
            });
        }

        for (index, tx) in self.data.iter().enumerate() {
            tx.validate(view).map_err(|e| BlockError::Transaction {
                index,
                reason: e.to_string(),
            })?;
        }

        let mut spent: HashMap<&Address, u128> = HashMap::new();
        for tx in self.data.iter().filter(|tx| !tx.is_mint(mint)) {
            *spent.entry(&tx.from).or_default() += tx.outflow();
        }
        for (address, total) in spent {
            if view.balance(address) < total as i128 {
                return Err(BlockError::Overspend {
                    address: address.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn has_valid_transactions(&self, view: &impl LedgerView) -> bool {
        self.validate_transactions(view).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainView;
    use crate::wallet::KeyPair;
    use std::sync::atomic::AtomicBool;

    fn reward_tx(mint: &Address, to: &Address, amount: u64) -> Transaction {
        Transaction::new(mint.clone(), to.clone(), amount, 0)
    }

    /// A genesis block funding `holder` with 1000.
    fn funded(mint: &Address, holder: &Address) -> Vec<Block> {
        vec![Block::new(0, vec![reward_tx(mint, holder, 1000)])]
    }

    fn signed(from: &KeyPair, to: &Address, amount: u64, gas: u64) -> Transaction {
        let mut tx = Transaction::new(from.address(), to.clone(), amount, gas);
        tx.sign(from).unwrap();
        tx
    }

    #[test]
    fn hash_matches_fields_before_and_after_mining() {
        let mint = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        let mut b = Block::new(1_700_000_000_000, vec![reward_tx(&mint, &miner, 298)]);
        assert_eq!(b.hash, b.compute_hash());

        b.prev_hash = "abc".into();
        b.refresh_hash();
        b.mine(2);
        assert_eq!(b.hash, b.compute_hash());
        assert!(b.hash.starts_with("00"));
    }

    #[test]
    fn zero_difficulty_needs_no_work() {
        let mut b = Block::new(42, vec![]);
        assert_eq!(b.mine(0), 0);
        assert_eq!(b.nonce, 0);
    }

    #[test]
    fn invalid_when_mutated() {
        let mint = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        let mut b = Block::new(7, vec![reward_tx(&mint, &miner, 298)]);
        b.mine(2);
        let old_hash = b.hash.clone();

        b.data[0].amount = 10_000;
        assert_ne!(old_hash, b.compute_hash());

        b.data[0].amount = 298;
        b.nonce += 1;
        assert_ne!(old_hash, b.compute_hash());
    }

    #[test]
    fn transaction_order_changes_hash() {
        let mint = KeyPair::generate().address();
        let a = KeyPair::generate().address();
        let c = KeyPair::generate().address();
        let t1 = reward_tx(&mint, &a, 1);
        let t2 = reward_tx(&mint, &c, 2);
        let b1 = Block::new(1, vec![t1.clone(), t2.clone()]);
        let b2 = Block::new(1, vec![t2, t1]);
        assert_ne!(b1.hash, b2.hash);
    }

    #[test]
    fn cancelled_search_stops() {
        let mut b = Block::new(1, vec![]);
        let cancel = AtomicBool::new(true);
        // 64 zeros is unreachable; only the flag ends the search
        assert_eq!(b.mine_until(64, &cancel), Err(LedgerError::MiningCancelled));
    }

    #[test]
    fn uncancelled_search_converges() {
        let mut b = Block::new(1, vec![]);
        let cancel = AtomicBool::new(false);
        let attempts = b.mine_until(1, &cancel).unwrap();
        assert!(b.meets_difficulty(1));
        assert_eq!(attempts, b.nonce);
    }

    #[test]
    fn reward_must_cover_base_plus_gas() {
        let mint = KeyPair::generate().address();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        let chain = funded(&mint, &alice.address());
        let view = ChainView::new(&chain, &mint, 298);

        let tx = signed(&alice, &bob, 50, 3);
        let good = Block::new(1, vec![reward_tx(&mint, &miner, 301), tx.clone()]);
        assert_eq!(good.validate_transactions(&view), Ok(()));

        let bad = Block::new(1, vec![reward_tx(&mint, &miner, 298), tx]);
        assert_eq!(
            bad.validate_transactions(&view),
            Err(BlockError::RewardMismatch {
                expected: 301,
                actual: 298
            })
        );
    }

    #[test]
    fn reward_with_gas_is_rejected() {
        let mint = KeyPair::generate().address();
        let alice = KeyPair::generate();
        let miner = KeyPair::generate().address();
        let chain = funded(&mint, &alice.address());
        let view = ChainView::new(&chain, &mint, 298);

        let b = Block::new(1, vec![Transaction::new(mint.clone(), miner, 298, 2)]);
        assert_eq!(
            b.validate_transactions(&view),
            Err(BlockError::Transaction {
                index: 0,
                reason: LedgerError::MintWithGas.to_string()
            })
        );
    }

    #[test]
    fn exactly_one_reward_transaction() {
        let mint = KeyPair::generate().address();
        let alice = KeyPair::generate();
        let miner = KeyPair::generate().address();
        let chain = funded(&mint, &alice.address());
        let view = ChainView::new(&chain, &mint, 298);

        let none = Block::new(1, vec![signed(&alice, &miner, 5, 0)]);
        assert_eq!(none.validate_transactions(&view), Err(BlockError::MintCount(0)));

        let two = Block::new(
            1,
            vec![reward_tx(&mint, &miner, 298), reward_tx(&mint, &miner, 298)],
        );
        assert_eq!(two.validate_transactions(&view), Err(BlockError::MintCount(2)));
    }

    #[test]
    fn invalid_member_is_reported_with_index() {
        let mint = KeyPair::generate().address();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        let chain = funded(&mint, &alice.address());
        let view = ChainView::new(&chain, &mint, 298);

        let unsigned = Transaction::new(alice.address(), bob, 5, 0);
        let b = Block::new(1, vec![reward_tx(&mint, &miner, 298), unsigned]);
        assert!(matches!(
            b.validate_transactions(&view),
            Err(BlockError::Transaction { index: 1, .. })
        ));
    }

    #[test]
    fn co_included_spends_cannot_exceed_balance() {
        let mint = KeyPair::generate().address();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        let chain = funded(&mint, &alice.address());
        let view = ChainView::new(&chain, &mint, 298);

        // each fits the 1000 balance on its own, together they do not
        let b = Block::new(
            1,
            vec![
                reward_tx(&mint, &miner, 298),
                signed(&alice, &bob, 600, 0),
                signed(&alice, &bob, 600, 0),
            ],
        );
        assert_eq!(
            b.validate_transactions(&view),
            Err(BlockError::Overspend {
                address: alice.address().to_string()
            })
        );
        assert!(!b.has_valid_transactions(&view));
    }
}
