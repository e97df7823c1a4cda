use crypto_secretbox::{
    aead::{AeadInPlace, KeyInit},
    Nonce, Tag, XSalsa20Poly1305,
};

use crate::error::Error;

/// Secretbox key length in bytes.
pub const KEY_LEN: usize = 32;
/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;
/// XSalsa20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// The all-zero nonce, used for the handshake boxes (each box key is
/// derived fresh and used exactly once).
pub const ZERO_NONCE: [u8; NONCE_LEN] = [0u8; NONCE_LEN];

/// Encrypt `buffer` in place, returning the detached 16-byte tag.
pub fn seal_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    buffer: &mut [u8],
) -> Result<[u8; TAG_LEN], Error> {
    let cipher = XSalsa20Poly1305::new(key.into());
    let tag = cipher
        .encrypt_in_place_detached(&Nonce::from(*nonce), b"", buffer)
        .map_err(|_| Error::ProtocolError)?;
    Ok(tag.into())
}

/// Decrypt `buffer` in place, verifying the detached 16-byte tag.
pub fn open_detached(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    buffer: &mut [u8],
) -> Result<(), Error> {
    let cipher = XSalsa20Poly1305::new(key.into());
    cipher
        .decrypt_in_place_detached(&Nonce::from(*nonce), b"", buffer, Tag::from_slice(tag))
        .map_err(|_| Error::CorruptData)
}

/// Seal `plaintext` into `out` in libsodium `secretbox_easy` layout:
/// 16-byte tag followed by the ciphertext. Returns the bytes written.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    let total = plaintext
        .len()
        .checked_add(TAG_LEN)
        .ok_or(Error::OutTooSmall)?;
    if out.len() < total {
        return Err(Error::OutTooSmall);
    }
    out[TAG_LEN..total].copy_from_slice(plaintext);
    let tag = seal_detached(key, nonce, &mut out[TAG_LEN..total])?;
    out[..TAG_LEN].copy_from_slice(&tag);
    Ok(total)
}

/// Open a tag-prefixed box into `out`. Returns the plaintext length.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    boxed: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    if boxed.len() < TAG_LEN {
        return Err(Error::CorruptData);
    }
    let plaintext_len = boxed.len() - TAG_LEN;
    if out.len() < plaintext_len {
        return Err(Error::OutTooSmall);
    }
    let (tag, ciphertext) = boxed.split_at(TAG_LEN);
    let tag: &[u8; TAG_LEN] = tag.try_into().map_err(|_| Error::CorruptData)?;
    out[..plaintext_len].copy_from_slice(ciphertext);
    open_detached(key, nonce, tag, &mut out[..plaintext_len])?;
    Ok(plaintext_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = [0x42u8; KEY_LEN];
        let plaintext = b"the ides of March";

        let mut boxed = [0u8; 64];
        let boxed_len = seal(&key, &ZERO_NONCE, plaintext, &mut boxed).unwrap();
        assert_eq!(boxed_len, plaintext.len() + TAG_LEN);

        let mut opened = [0u8; 64];
        let opened_len = open(&key, &ZERO_NONCE, &boxed[..boxed_len], &mut opened).unwrap();
        assert_eq!(&opened[..opened_len], plaintext);
    }

    #[test]
    fn open_wrong_key_fails() {
        let key1 = [0x42u8; KEY_LEN];
        let key2 = [0x43u8; KEY_LEN];

        let mut boxed = [0u8; 64];
        let boxed_len = seal(&key1, &ZERO_NONCE, b"hello", &mut boxed).unwrap();

        let mut out = [0u8; 64];
        let result = open(&key2, &ZERO_NONCE, &boxed[..boxed_len], &mut out);
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn open_wrong_nonce_fails() {
        let key = [0x42u8; KEY_LEN];
        let mut nonce = ZERO_NONCE;

        let mut boxed = [0u8; 64];
        let boxed_len = seal(&key, &nonce, b"hello", &mut boxed).unwrap();

        nonce[NONCE_LEN - 1] = 1;
        let mut out = [0u8; 64];
        let result = open(&key, &nonce, &boxed[..boxed_len], &mut out);
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn open_tampered_ciphertext_fails() {
        let key = [0x42u8; KEY_LEN];

        let mut boxed = [0u8; 64];
        let boxed_len = seal(&key, &ZERO_NONCE, b"hello", &mut boxed).unwrap();
        boxed[TAG_LEN] ^= 0x01;

        let mut out = [0u8; 64];
        let result = open(&key, &ZERO_NONCE, &boxed[..boxed_len], &mut out);
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn seal_buffer_too_small() {
        let key = [0x42u8; KEY_LEN];
        let mut out = [0u8; 8]; // too small for 5 + 16
        let result = seal(&key, &ZERO_NONCE, b"hello", &mut out);
        assert_eq!(result, Err(Error::OutTooSmall));
    }

    #[test]
    fn open_truncated_box_fails() {
        let key = [0x42u8; KEY_LEN];
        let mut out = [0u8; 16];
        let result = open(&key, &ZERO_NONCE, &[0u8; 8], &mut out);
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn detached_round_trip() {
        let key = [0x11u8; KEY_LEN];
        let nonce = [0x22u8; NONCE_LEN];
        let mut buffer = *b"attack at dawn";

        let tag = seal_detached(&key, &nonce, &mut buffer).unwrap();
        assert_ne!(&buffer, b"attack at dawn");

        open_detached(&key, &nonce, &tag, &mut buffer).unwrap();
        assert_eq!(&buffer, b"attack at dawn");
    }
}
