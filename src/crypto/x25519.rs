use ed25519_dalek::VerifyingKey;
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;

/// DH output length in bytes (X25519 = 32).
pub const DH_LEN: usize = 32;

/// A shared secret resulting from a Diffie-Hellman operation.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl SharedSecret {
    /// Access the raw 32-byte shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Generate a fresh ephemeral X25519 keypair.
///
/// Returns (secret, public_key_bytes).
pub fn generate_keypair(rng: &mut impl CryptoRngCore) -> (StaticSecret, [u8; DH_LEN]) {
    let secret = StaticSecret::random_from_rng(rng);
    let public = X25519PublicKey::from(&secret);
    (secret, public.to_bytes())
}

/// Perform DH with a local secret and a remote public key.
///
/// Returns the 32-byte shared secret, or `Error::CorruptData` if the
/// result is the all-zeros point (low-order input), per RFC 7748 §6.1.
pub fn dh(local: &StaticSecret, remote: &[u8; DH_LEN]) -> Result<SharedSecret, Error> {
    let shared = local.diffie_hellman(&X25519PublicKey::from(*remote));
    validate_shared_secret(shared.as_bytes())
}

/// Convert an Ed25519 public key to its X25519 (Montgomery) form.
///
/// Matches libsodium's `crypto_sign_ed25519_pk_to_curve25519`. Fails with
/// `Error::CorruptData` if the bytes are not a valid curve point.
pub fn montgomery_from_ed25519(public: &[u8; 32]) -> Result<[u8; DH_LEN], Error> {
    let key = VerifyingKey::from_bytes(public).map_err(|_| Error::CorruptData)?;
    Ok(key.to_montgomery().to_bytes())
}

/// Reject the all-zeros shared secret, which indicates a low-order public key.
fn validate_shared_secret(bytes: &[u8; 32]) -> Result<SharedSecret, Error> {
    let is_zero = bytes.ct_eq(&[0u8; 32]);
    if bool::from(is_zero) {
        Err(Error::CorruptData)
    } else {
        Ok(SharedSecret(*bytes))
    }
}
