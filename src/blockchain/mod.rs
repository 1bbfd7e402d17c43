pub mod block;
pub mod miner;
pub mod model;
pub mod view;

pub use block::Block;
pub use miner::{MinedBlock, MiningJob, SharedLedger};
pub use model::{Ledger, MiningTemplate, next_difficulty};
pub use view::{ChainView, LedgerView};

/// Default Proof-of-Work difficulty (number of leading zeros).
pub const DEFAULT_DIFFICULTY: u32 = 1;

/// Base block reward paid to the miner, before gas.
pub const BASE_REWARD: u64 = 298;

/// Target milliseconds between blocks for retargeting.
pub const TARGET_BLOCK_TIME_MS: i64 = 30_000;

/// Amount issued to the holder in the genesis block.
pub const GENESIS_ISSUANCE: u64 = 100_000;

/// Difficulty floor; retargeting never goes below it.
pub const DIFF_MIN: u32 = 1;

/// No ceiling unless a config sets one.
pub const DIFF_MAX: u32 = u32::MAX;

/// How many nonces a cancellable search tries between flag checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;
