//! Cryptographic primitives for the Secret Handshake protocol.
//!
//! - [`hash`]: SHA-256 hashing and HMAC-SHA-512-256
//! - [`secretbox`]: XSalsa20-Poly1305 secretbox encryption
//! - [`x25519`]: X25519 Diffie-Hellman and Ed25519 key conversion

pub mod hash;
pub mod secretbox;
pub mod x25519;
