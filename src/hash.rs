use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// SHA-256 of `data`, rendered as lowercase hex (64 chars).
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zeros(hash_hex: &str) -> usize {
    hash_hex.chars().take_while(|c| *c == '0').count()
}

/// True if the hex digest starts with at least `difficulty` zeros.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    leading_zeros(hash_hex) >= difficulty as usize
}
