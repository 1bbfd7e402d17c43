use thiserror::Error;

/// Why a single block fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("stored hash does not match block contents")]
    HashMismatch,

    #[error("prev_hash does not match the previous block's hash")]
    BrokenLink,

    #[error("hash does not meet difficulty {0}")]
    InsufficientWork(u32),

    #[error("expected exactly one mint transaction, found {0}")]
    MintCount(usize),

    #[error("reward transaction pays {actual}, expected {expected}")]
    RewardMismatch { expected: u64, actual: u64 },

    #[error("reward plus gas overflows")]
    RewardOverflow,

    #[error("transaction #{index} is invalid: {reason}")]
    Transaction { index: usize, reason: String },

    #[error("sender {address} spends more than its balance within the block")]
    Overspend { address: String },
}

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("amount must be > 0")]
    InvalidAmount,

    #[error("mint transactions carry no gas")]
    MintWithGas,

    #[error("transaction is not signed")]
    MissingSignature,

    #[error("signature does not verify against sender")]
    InvalidSignature,

    #[error("keypair does not belong to sender {0}")]
    InvalidSigner(String),

    #[error("insufficient balance for {address}: has {balance}, needs {required}")]
    InsufficientBalance {
        address: String,
        balance: i128,
        required: u128,
    },

    #[error("mint transactions cannot be submitted to the pool")]
    ReservedSender,

    #[error("invalid block: {0}")]
    BlockInvalid(#[from] BlockError),

    #[error("chain invalid at block {index}: {reason}")]
    ChainInvalid { index: usize, reason: BlockError },

    #[error("chain has no blocks")]
    EmptyChain,

    #[error("chain head moved while mining")]
    StaleTemplate,

    #[error("mining cancelled")]
    MiningCancelled,

    #[error("mining thread panicked")]
    MinerPanicked,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
