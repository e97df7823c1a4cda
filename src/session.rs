use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::PublicKey;

/// Length of a symmetric session key in bytes.
pub const SESSION_KEY_LEN: usize = 32;
/// Length of a record nonce in bytes.
pub const NONCE_LEN: usize = 24;

/// A 256-bit symmetric session key derived by the handshake.
pub type SessionKey = [u8; SESSION_KEY_LEN];

/// A 24-byte record nonce, treated as a big-endian counter.
///
/// Each direction of a session owns its own nonce; the record codec advances
/// it by one per encryption.
#[derive(Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Create from a raw 24-byte value.
    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes of this nonce.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Advance the counter by one, big-endian.
    pub(crate) fn increment(&mut self) {
        for byte in self.0.iter_mut().rev() {
            let (value, carry) = byte.overflowing_add(1);
            *byte = value;
            if !carry {
                break;
            }
        }
    }
}

impl core::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Nonce({:02x?})", &self.0[..4])
    }
}

/// The outcome of a successful handshake.
///
/// Keys and nonces come in symmetric pairs: one peer's `encryption_key`
/// equals the other's `decryption_key`, and likewise for the nonces. Key
/// material is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    /// Key for records this side sends.
    pub encryption_key: SessionKey,
    /// Starting nonce for records this side sends.
    pub encryption_nonce: Nonce,
    /// Key for records this side receives.
    pub decryption_key: SessionKey,
    /// Starting nonce for records this side receives.
    pub decryption_nonce: Nonce,
    /// The peer's authenticated long-term public key.
    #[zeroize(skip)]
    pub peer_public_key: PublicKey,
}
