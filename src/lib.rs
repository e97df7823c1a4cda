#![deny(unsafe_code)]

//! # secret-handshake
//!
//! A pure, sans-IO implementation of the
//! [Secret Handshake](https://dominictarr.github.io/secret-handshake-paper/shs.pdf)
//! mutual-authentication protocol, together with the box-stream style
//! record encryption that follows it.
//!
//! Two peers, each holding a long-term Ed25519 identity and a shared
//! 32-byte application ID, run a four-message exchange over any reliable
//! byte channel. On success each side holds a [`Session`]: symmetric keys,
//! initial nonces, and the peer's authenticated public key. The record
//! layer then turns plaintext writes into authenticated, nonce-sequenced
//! records and back, tolerating arbitrary chunk boundaries on receive.
//!
//! The crate performs no I/O and never blocks: the handshake hands out
//! byte buffers to transmit and to fill, and the streams buffer whatever
//! the transport delivers.
//!
//! ## Security properties
//!
//! - The server's identity is never sent in the clear; the client's is
//!   sent only inside an authenticated box
//! - All-zero Diffie-Hellman outputs (low-order points) are rejected
//! - Key material is zeroized on drop; comparisons are constant-time
//! - No panics on network input; a failed handshake or stream is poisoned
//!   and yields nothing further

pub mod crypto;
pub mod error;

mod exchange;
mod handshake;
mod keys;
mod record;
mod session;
mod stream;

// Re-export the primary public API
pub use error::Error;
pub use handshake::Handshake;
pub use keys::{AppId, Context, PublicKey, SecretKey};
pub use record::{Decryptor, Encryptor, Framing, MAX_RECORD_LEN};
pub use session::{Nonce, Session, SessionKey};
pub use stream::{DecryptionStream, EncryptionStream};
