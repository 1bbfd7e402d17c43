//! Single-process Proof-of-Work ledger: signed transfers, hash-chained
//! blocks, gas rewards and difficulty retargeting.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod hash;
pub mod transaction;
pub mod wallet;

pub use blockchain::{Block, Ledger, SharedLedger};
pub use config::{GenesisConfig, LedgerConfig};
pub use error::{BlockError, LedgerError, Result};
pub use transaction::Transaction;
pub use wallet::{Address, KeyPair};
