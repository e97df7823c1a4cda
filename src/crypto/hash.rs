use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

/// Hash output length (SHA-256 = 32 bytes).
pub const HASH_LEN: usize = 32;

/// MAC output length (HMAC-SHA-512 truncated to 256 bits).
pub const MAC_LEN: usize = 32;

/// Compute the SHA-256 hash of the input.
pub fn sha256(input: &[u8]) -> [u8; HASH_LEN] {
    sha256_parts(&[input])
}

/// SHA-256 over multiple slices fed sequentially to the hasher.
///
/// Avoids concatenating inputs into a temporary buffer.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// HMAC-SHA-512-256: the first 256 bits of HMAC-SHA-512.
///
/// This is libsodium's `crypto_auth` construction, which the protocol uses
/// for the challenge tags and the initial record nonces.
pub fn hmac(key: &[u8; 32], data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&full[..MAC_LEN]);
    out
}
