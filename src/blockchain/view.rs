use super::Block;
use crate::wallet::Address;

/// What a transaction or block needs to know about the chain to validate.
pub trait LedgerView {
    fn mint_address(&self) -> &Address;

    /// Base block reward, before gas.
    fn reward(&self) -> u64;

    /// Balance of `address` as seen by this view.
    fn balance(&self, address: &Address) -> i128;
}

/// A read-only view over a prefix of blocks.
#[derive(Debug, Clone, Copy)]
pub struct ChainView<'a> {
    pub blocks: &'a [Block],
    pub mint_address: &'a Address,
    pub reward: u64,
}

impl<'a> ChainView<'a> {
    pub fn new(blocks: &'a [Block], mint_address: &'a Address, reward: u64) -> Self {
        Self {
            blocks,
            mint_address,
            reward,
        }
    }
}

impl LedgerView for ChainView<'_> {
    fn mint_address(&self) -> &Address {
        self.mint_address
    }

    fn reward(&self) -> u64 {
        self.reward
    }

    fn balance(&self, address: &Address) -> i128 {
        balance_of(self.blocks, address)
    }
}

/// Fold every transaction in `blocks`: senders pay `amount + gas`,
/// recipients receive `amount`.
pub fn balance_of(blocks: &[Block], address: &Address) -> i128 {
    let mut balance: i128 = 0;
    for tx in blocks.iter().flat_map(|b| b.data.iter()) {
        if &tx.from == address {
            balance -= tx.outflow() as i128;
        }
        if &tx.to == address {
            balance += tx.amount as i128;
        }
    }
    balance
}
