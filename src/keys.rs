use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRngCore, OsRng};
use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;

use crate::crypto::x25519;
use crate::error::Error;

/// Length of a secret key seed in bytes.
pub const SEED_LEN: usize = 32;
/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// A long-term Ed25519 signing identity.
///
/// The inner key material is zeroized from memory when dropped.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Generate a new random key from OS entropy.
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a new random key using the provided RNG.
    pub fn generate_with_rng(rng: &mut impl CryptoRngCore) -> Self {
        Self(SigningKey::generate(rng))
    }

    /// Reconstitute a key from its 32-byte seed. Deterministic.
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }

    /// Export the 32-byte seed that regenerates this key.
    pub fn seed(&self) -> [u8; SEED_LEN] {
        self.0.to_bytes()
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Sign a message, returning the detached 64-byte signature.
    pub(crate) fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.0.sign(message).to_bytes()
    }

    /// The X25519 form of this key, for key agreement with ephemeral keys.
    ///
    /// Matches libsodium's `crypto_sign_ed25519_sk_to_curve25519`: the seed
    /// is hashed and the first half clamped into a Montgomery scalar.
    pub(crate) fn key_agreement_secret(&self) -> StaticSecret {
        StaticSecret::from(self.0.to_scalar_bytes())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time over the seed material.
        bool::from(self.0.to_bytes().ct_eq(&other.0.to_bytes()))
    }
}

impl Eq for SecretKey {}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// A 32-byte Ed25519 public signing key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// The length of a public key in bytes.
    pub const LEN: usize = 32;

    /// Create from raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a detached signature over `message`.
    pub(crate) fn verify(
        &self,
        message: &[u8],
        signature: &[u8; SIGNATURE_LEN],
    ) -> Result<(), Error> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| Error::CorruptData)?;
        key.verify(message, &Signature::from_bytes(signature))
            .map_err(|_| Error::CorruptData)
    }

    /// The X25519 (Montgomery) form of this key, for key agreement.
    pub(crate) fn key_agreement_public(&self) -> Result<[u8; 32], Error> {
        x25519::montgomery_from_ed25519(&self.0)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PublicKey({:02x?})", &self.0[..4])
    }
}

/// A 32-byte tag identifying the application-level protocol.
///
/// Both peers must use the same `AppId` to complete a handshake; it keys
/// every HMAC in the exchange.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AppId([u8; 32]);

impl AppId {
    /// The length of an application ID in bytes.
    pub const LEN: usize = 32;

    /// Create from a raw 32-byte value.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build an ID from a string: up to 32 bytes are copied, the rest is
    /// zero padding. Longer strings are truncated. No hashing.
    pub fn from_str_padded(s: &str) -> Self {
        let mut id = [0u8; Self::LEN];
        let bytes = s.as_bytes();
        let n = bytes.len().min(Self::LEN);
        id[..n].copy_from_slice(&bytes[..n]);
        Self(id)
    }

    /// Access the raw bytes of this ID.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl core::fmt::Debug for AppId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "AppId({:02x?})", &self.0[..4])
    }
}

/// The local state needed to start a handshake: application ID and identity.
#[derive(Clone)]
pub struct Context {
    /// Tag identifying the application protocol.
    pub app_id: AppId,
    /// This side's long-term signing identity.
    pub key: SecretKey,
}

impl Context {
    /// Bundle an application ID with a local identity key.
    pub fn new(app_id: AppId, key: SecretKey) -> Self {
        Self { app_id, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_round_trips() {
        let key = SecretKey::generate();
        let rebuilt = SecretKey::from_seed(key.seed());
        assert_eq!(rebuilt, key);
        assert_eq!(rebuilt.public_key(), key.public_key());
    }

    #[test]
    fn reconstituted_key_signs_identically() {
        let key = SecretKey::generate();
        let rebuilt = SecretKey::from_seed(key.seed());

        let sig1 = key.sign(b"message");
        let sig2 = rebuilt.sign(b"message");
        assert_eq!(sig1, sig2);
        key.public_key().verify(b"message", &sig2).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let key = SecretKey::generate();
        let sig = key.sign(b"message");
        let result = key.public_key().verify(b"other message", &sig);
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn app_id_empty_string_is_all_zeros() {
        let id = AppId::from_str_padded("");
        assert_eq!(id.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn app_id_short_string_is_zero_padded() {
        let id = AppId::from_str_padded("ABCDEF");
        assert_eq!(
            hex::encode(id.as_bytes()),
            "4142434445460000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn app_id_long_string_is_truncated() {
        let id = AppId::from_str_padded("A string that is too long to fit in an AppID");
        assert_eq!(
            hex::encode(id.as_bytes()),
            hex::encode(b"A string that is too long to fit")
        );
    }
}
