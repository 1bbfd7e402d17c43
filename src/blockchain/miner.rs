use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use super::{Block, Ledger, MiningTemplate};
use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;
use crate::wallet::Address;

/// Summary of a block this process mined and appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    pub height: usize,
    pub hash: String,
    pub nonce: u64,
    pub attempts: u64,
}

/// Thread-safe handle over a [`Ledger`].
///
/// Proof-of-Work runs outside the lock against a template; only the final
/// commit takes the write lock, so readers never see a half-appended block.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read().expect("ledger lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.write().expect("ledger lock poisoned")
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<()> {
        self.write().add_transaction(tx)
    }

    pub fn balance(&self, address: &Address) -> i128 {
        self.read().balance(address)
    }

    pub fn is_valid(&self) -> bool {
        self.read().is_valid()
    }

    /// Copy of the chain as of now.
    pub fn snapshot(&self) -> Vec<Block> {
        self.read().chain().to_vec()
    }

    /// Mine on the calling thread without holding the lock during the search.
    pub fn mine_transactions(&self, reward_address: &Address) -> Result<Option<MinedBlock>> {
        let Some(template) = self.read().prepare_template(reward_address)? else {
            return Ok(None);
        };
        let never = AtomicBool::new(false);
        mine_and_commit(&self.inner, template, &never).map(Some)
    }

    /// Start mining the current pool on a background thread.
    /// Returns `None` when the pool is empty.
    pub fn spawn_mining(&self, reward_address: &Address) -> Result<Option<MiningJob>> {
        let Some(template) = self.read().prepare_template(reward_address)? else {
            return Ok(None);
        };
        info!(
            "MINER - mining {} txs on {} at difficulty {}",
            template.included, template.block.prev_hash, template.difficulty
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || mine_and_commit(&inner, template, &flag));
        Ok(Some(MiningJob {
            cancel,
            handle: Some(handle),
        }))
    }
}

fn mine_and_commit(
    inner: &RwLock<Ledger>,
    mut template: MiningTemplate,
    cancel: &AtomicBool,
) -> Result<MinedBlock> {
    let attempts = match template.block.mine_until(template.difficulty, cancel) {
        Ok(attempts) => attempts,
        Err(e) => {
            warn!("MINER - search on {} abandoned", template.block.prev_hash);
            return Err(e);
        }
    };
    if cancel.load(Ordering::Relaxed) {
        warn!("MINER - cancelled after finding nonce {}", template.block.nonce);
        return Err(LedgerError::MiningCancelled);
    }
    debug!(
        "MINER - nonce {} found after {} attempts",
        template.block.nonce, attempts
    );

    let mut ledger = inner.write().expect("ledger lock poisoned");
    let (hash, nonce) = {
        let block = ledger.commit_template(template)?;
        (block.hash.clone(), block.nonce)
    };
    Ok(MinedBlock {
        height: ledger.len() - 1,
        hash,
        nonce,
        attempts,
    })
}

/// A background Proof-of-Work search. Dropping the job cancels it.
#[derive(Debug)]
pub struct MiningJob {
    cancel: Arc<AtomicBool>,
    // taken by `join`
    handle: Option<JoinHandle<Result<MinedBlock>>>,
}

impl MiningJob {
    /// Ask the search to stop; the ledger is left untouched.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the job. Fails with `MiningCancelled` after [`cancel`],
    /// or `StaleTemplate` if another block was appended first.
    ///
    /// [`cancel`]: MiningJob::cancel
    pub fn join(mut self) -> Result<MinedBlock> {
        let handle = self.handle.take().ok_or(LedgerError::MinerPanicked)?;
        handle.join().map_err(|_| LedgerError::MinerPanicked)?
    }
}

impl Drop for MiningJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("MINER - job dropped, cancelling search");
            self.cancel.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenesisConfig, LedgerConfig};
    use crate::wallet::KeyPair;
    use std::time::{Duration, Instant};

    fn shared(config: LedgerConfig) -> (SharedLedger, KeyPair) {
        let mint = KeyPair::generate();
        let holder = KeyPair::generate();
        let ledger = Ledger::new(config, GenesisConfig::new(mint.address(), holder.address()))
            .unwrap();
        (SharedLedger::new(ledger), holder)
    }

    fn steady() -> LedgerConfig {
        LedgerConfig {
            block_time_ms: 0,
            ..LedgerConfig::default()
        }
    }

    /// 64 leading zeros never happens; only cancellation ends the search.
    fn unreachable_work() -> LedgerConfig {
        LedgerConfig {
            difficulty: 64,
            max_difficulty: 64,
            ..LedgerConfig::default()
        }
    }

    fn transfer(from: &KeyPair, to: &Address, amount: u64, gas: u64) -> Transaction {
        let mut tx = Transaction::new(from.address(), to.clone(), amount, gas);
        tx.sign(from).unwrap();
        tx
    }

    #[test]
    fn background_job_appends_block() {
        let (ledger, holder) = shared(steady());
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        ledger.add_transaction(transfer(&holder, &bob, 50, 1)).unwrap();

        let job = ledger.spawn_mining(&miner).unwrap().unwrap();
        let mined = job.join().unwrap();

        assert_eq!(mined.height, 1);
        assert_eq!(ledger.snapshot()[1].hash, mined.hash);
        assert_eq!(ledger.balance(&miner), 299);
        assert!(ledger.read().pending().is_empty());
        assert!(ledger.is_valid());
    }

    #[test]
    fn empty_pool_spawns_nothing() {
        let (ledger, _) = shared(steady());
        let miner = KeyPair::generate().address();
        assert!(ledger.spawn_mining(&miner).unwrap().is_none());
        assert!(ledger.mine_transactions(&miner).unwrap().is_none());
        assert_eq!(ledger.read().len(), 1);
    }

    #[test]
    fn cancelled_job_leaves_ledger_untouched() {
        let (ledger, holder) = shared(unreachable_work());
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        ledger.add_transaction(transfer(&holder, &bob, 5, 0)).unwrap();

        let job = ledger.spawn_mining(&miner).unwrap().unwrap();

        // reads proceed while the search runs
        assert_eq!(ledger.balance(&holder.address()), 100_000);
        assert!(ledger.is_valid());

        job.cancel();
        assert_eq!(job.join(), Err(LedgerError::MiningCancelled));
        assert_eq!(ledger.read().len(), 1);
        assert_eq!(ledger.read().pending().len(), 1);
    }

    #[test]
    fn dropped_job_stops_and_releases_ledger() {
        let (ledger, holder) = shared(unreachable_work());
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        ledger.add_transaction(transfer(&holder, &bob, 5, 0)).unwrap();

        let job = ledger.spawn_mining(&miner).unwrap().unwrap();
        assert_eq!(Arc::strong_count(&ledger.inner), 2);
        drop(job);

        // the miner thread holds the other reference until it exits
        let deadline = Instant::now() + Duration::from_secs(10);
        while Arc::strong_count(&ledger.inner) > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(Arc::strong_count(&ledger.inner), 1);
        assert_eq!(ledger.read().len(), 1);
        assert_eq!(ledger.read().pending().len(), 1);
    }

    #[test]
    fn loser_of_a_race_is_stale() {
        let (ledger, holder) = shared(steady());
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        ledger.add_transaction(transfer(&holder, &bob, 5, 0)).unwrap();

        let mut behind = ledger.read().prepare_template(&miner).unwrap().unwrap();
        ledger.mine_transactions(&miner).unwrap().unwrap();

        behind.block.mine(behind.difficulty);
        let never = AtomicBool::new(false);
        assert_eq!(
            mine_and_commit(&ledger.inner, behind, &never),
            Err(LedgerError::StaleTemplate)
        );
        assert_eq!(ledger.read().len(), 2);
    }

    #[test]
    fn foreground_mining_reports_block() {
        let (ledger, holder) = shared(steady());
        let bob = KeyPair::generate().address();
        let miner = KeyPair::generate().address();
        ledger.add_transaction(transfer(&holder, &bob, 5, 2)).unwrap();

        let mined = ledger.mine_transactions(&miner).unwrap().unwrap();
        let chain = ledger.snapshot();
        assert_eq!(mined.height, 1);
        assert_eq!(mined.nonce, chain[1].nonce);
        assert_eq!(chain[1].data[0].amount, 300);
    }
}
