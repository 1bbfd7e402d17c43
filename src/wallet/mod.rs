use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// Account address: hex of a compressed secp256k1 public key.
/// The mint address may be any non-empty string agreed in the genesis config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the public key behind this address.
    pub fn public_key(&self) -> Result<PublicKey> {
        let bytes =
            hex::decode(&self.0).map_err(|_| LedgerError::MalformedAddress(self.0.clone()))?;
        PublicKey::from_slice(&bytes).map_err(|_| LedgerError::MalformedAddress(self.0.clone()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&PublicKey> for Address {
    fn from(pk: &PublicKey) -> Self {
        Self(hex::encode(pk.serialize()))
    }
}

/// A secp256k1 signing key with its derived address.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }

    /// Load a keypair from a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|_| LedgerError::InvalidKey("secret key is not hex".into()))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|_| LedgerError::InvalidKey("secret key out of range".into()))?;
        let public = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret);
        Ok(Self { secret, public })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from(&self.public)
    }

    /// Sign a 32-byte digest; returns the hex of the DER signature.
    /// RFC 6979 nonces make this deterministic.
    pub fn sign_digest(&self, msg32: [u8; 32]) -> Result<String> {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest_slice(&msg32)
            .map_err(|_| LedgerError::InvalidKey("invalid message length".into()))?;
        let sig = secp.sign_ecdsa(&msg, &self.secret);
        Ok(hex::encode(&sig.serialize_der()[..]))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish()
    }
}

/// Verify a hex DER signature over `msg32` against `address`.
/// A signature that does not decode is reported as not verifying.
pub fn verify_signature_hex(address: &Address, sig_hex: &str, msg32: [u8; 32]) -> Result<bool> {
    let pk = address.public_key()?;
    let secp = Secp256k1::verification_only();

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return Ok(false);
    };
    let Ok(sig) = Signature::from_der(&sig_bytes) else {
        return Ok(false);
    };
    let msg = Message::from_digest_slice(&msg32)
        .map_err(|_| LedgerError::InvalidKey("invalid message length".into()))?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}
