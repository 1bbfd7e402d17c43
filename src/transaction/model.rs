use serde::{Deserialize, Serialize};

use crate::blockchain::LedgerView;
use crate::error::{LedgerError, Result};
use crate::hash::{sha256, sha256_hex};
use crate::wallet::{Address, KeyPair, verify_signature_hex};

/// A value transfer between two addresses.
///
/// Field order is part of the block hash preimage (blocks serialize their
/// transactions as JSON), so do not reorder fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    /// Fee paid by the sender to whoever mines the block.
    pub gas: u64,
    /// Hex-encoded DER ECDSA signature over `sighash()`.
    pub signature: Option<String>,
}

impl Transaction {
    pub fn new(from: Address, to: Address, amount: u64, gas: u64) -> Self {
        Self {
            from,
            to,
            amount,
            gas,
            signature: None,
        }
    }

    /// Canonical signing payload: `from ++ to ++ amount ++ gas`.
    pub fn signing_payload(&self) -> Vec<u8> {
        format!("{}{}{}{}", self.from, self.to, self.amount, self.gas).into_bytes()
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> [u8; 32] {
        sha256(&self.signing_payload())
    }

    /// Content id over the whole record, signature included.
    pub fn txid(&self) -> String {
        let json = serde_json::to_vec(self).expect("serialize transaction");
        sha256_hex(&json)
    }

    pub fn is_mint(&self, mint_address: &Address) -> bool {
        &self.from == mint_address
    }

    /// `amount + gas`, the total debited from the sender.
    pub fn outflow(&self) -> u128 {
        self.amount as u128 + self.gas as u128
    }

    /// Sign with `key`, which must own `from`.
    pub fn sign(&mut self, key: &KeyPair) -> Result<()> {
        if key.address() != self.from {
            return Err(LedgerError::InvalidSigner(self.from.to_string()));
        }
        self.signature = Some(key.sign_digest(self.sighash())?);
        Ok(())
    }

    /// Check this transaction against a ledger view.
    /// Mint transactions are exempt from signature and balance checks.
    pub fn validate(&self, view: &impl LedgerView) -> Result<()> {
        if self.from.is_empty() {
            return Err(LedgerError::MissingField("from"));
        }
        if self.to.is_empty() {
            return Err(LedgerError::MissingField("to"));
        }
        if self.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.is_mint(view.mint_address()) {
            if self.gas != 0 {
                return Err(LedgerError::MintWithGas);
            }
            return Ok(());
        }

        self.from.public_key()?;
        self.to.public_key()?;

        let signature = self
            .signature
            .as_deref()
            .ok_or(LedgerError::MissingSignature)?;
        if !verify_signature_hex(&self.from, signature, self.sighash())? {
            return Err(LedgerError::InvalidSignature);
        }

        let balance = view.balance(&self.from);
        let required = self.outflow();
        if balance < required as i128 {
            return Err(LedgerError::InsufficientBalance {
                address: self.from.to_string(),
                balance,
                required,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self, view: &impl LedgerView) -> bool {
        self.validate(view).is_ok()
    }
}
