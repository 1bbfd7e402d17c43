use std::env;
use std::str::FromStr;

use crate::blockchain::{
    BASE_REWARD, DEFAULT_DIFFICULTY, DIFF_MAX, DIFF_MIN, GENESIS_ISSUANCE, TARGET_BLOCK_TIME_MS,
};
use crate::error::{LedgerError, Result};
use crate::wallet::{Address, KeyPair};

/// Mining and reward policy for a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Starting Proof-of-Work difficulty.
    pub difficulty: u32,
    /// Target milliseconds between blocks.
    pub block_time_ms: i64,
    /// Base reward per block, before gas.
    pub reward: u64,
    pub min_difficulty: u32,
    /// Ceiling for retargeting; `u32::MAX` (the default) means none.
    pub max_difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            block_time_ms: TARGET_BLOCK_TIME_MS,
            reward: BASE_REWARD,
            min_difficulty: DIFF_MIN,
            max_difficulty: DIFF_MAX,
        }
    }
}

impl LedgerConfig {
    /// Read overrides from `LEDGER_*` environment variables.
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            difficulty: env_or("LEDGER_DIFFICULTY", defaults.difficulty),
            block_time_ms: env_or("LEDGER_BLOCK_TIME_MS", defaults.block_time_ms),
            reward: env_or("LEDGER_REWARD", defaults.reward),
            min_difficulty: env_or("LEDGER_MIN_DIFFICULTY", defaults.min_difficulty),
            max_difficulty: env_or("LEDGER_MAX_DIFFICULTY", defaults.max_difficulty),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_difficulty == 0 {
            return Err(LedgerError::Config("min_difficulty must be >= 1".into()));
        }
        if self.min_difficulty > self.max_difficulty {
            return Err(LedgerError::Config(format!(
                "min_difficulty {} exceeds max_difficulty {}",
                self.min_difficulty, self.max_difficulty
            )));
        }
        if self.reward == 0 {
            return Err(LedgerError::Config("reward must be > 0".into()));
        }
        if self.block_time_ms < 0 {
            return Err(LedgerError::Config("block_time_ms must be >= 0".into()));
        }
        Ok(())
    }

    /// Clamp a difficulty into the configured bounds.
    pub fn clamp(&self, difficulty: u32) -> u32 {
        difficulty.clamp(self.min_difficulty, self.max_difficulty)
    }
}

/// Who issues currency and who receives the initial supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    pub mint_address: Address,
    pub holder_address: Address,
    pub initial_issuance: u64,
}

impl GenesisConfig {
    pub fn new(mint_address: Address, holder_address: Address) -> Self {
        Self {
            mint_address,
            holder_address,
            initial_issuance: GENESIS_ISSUANCE,
        }
    }

    pub fn with_issuance(mut self, initial_issuance: u64) -> Self {
        self.initial_issuance = initial_issuance;
        self
    }
}

/// Load a keypair from a hex secret in `var`, or generate a fresh one.
pub fn keypair_from_env(var: &str) -> Result<KeyPair> {
    match env::var(var) {
        Ok(secret) if !secret.trim().is_empty() => KeyPair::from_secret_hex(&secret),
        _ => Ok(KeyPair::generate()),
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
