//! Message-oriented record encryption using keys and nonces from a
//! [`Session`].
//!
//! Each plaintext message becomes one self-describing record on the wire.
//! Records must be decrypted whole, in the order they were encrypted; the
//! nonce is a per-direction big-endian counter advanced per record.
//!
//! Two framings are supported; both peers must use the same one:
//!
//! ```text
//! Compact:    len_be(2) ‖ tag(16) ‖ ciphertext(len)
//! BoxStream:  header_tag(16) ‖ sealed_header(18) ‖ body_ciphertext(len)
//!             where header = len_be(2) ‖ body_tag(16)
//! ```
//!
//! `Compact` costs 18 bytes per record but exposes message lengths to an
//! eavesdropper. `BoxStream` is the Scuttlebutt box-stream layout: 34 bytes
//! per record, lengths sealed inside the header. In `BoxStream` framing the
//! body is sealed with nonce n and the header with nonce n+1, so each record
//! advances the nonce twice.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::secretbox::{self, TAG_LEN};
use crate::error::Error;
use crate::session::{Nonce, Session, SessionKey};

/// Maximum plaintext length of a single record.
pub const MAX_RECORD_LEN: usize = 0xFFFF;

const LEN_LEN: usize = 2;
/// Compact overhead; also the cleartext size of a BoxStream header.
const HEADER_LEN: usize = LEN_LEN + TAG_LEN; // 18
/// A BoxStream header as it appears on the wire, sealed.
const BOXED_HEADER_LEN: usize = TAG_LEN + HEADER_LEN; // 34

/// On-wire record layout. Both peers must agree; a mismatch surfaces as
/// `CorruptData` on the first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 18 bytes of overhead; message lengths are eavesdroppable.
    #[default]
    Compact,
    /// Scuttlebutt-compatible box-stream: 34 bytes of overhead, message
    /// lengths sealed.
    BoxStream,
}

impl Framing {
    /// Per-record overhead in bytes.
    pub fn overhead(self) -> usize {
        match self {
            Framing::Compact => HEADER_LEN,
            Framing::BoxStream => BOXED_HEADER_LEN,
        }
    }

    /// The on-wire size of a record carrying `plaintext_len` bytes.
    pub fn encrypted_size(self, plaintext_len: usize) -> usize {
        self.overhead() + plaintext_len
    }

    /// Where the body ciphertext starts within a record.
    fn body_offset(self) -> usize {
        self.overhead()
    }
}

/// Internal result of parsing the front of a record.
enum Header {
    Compact { plaintext_len: usize },
    BoxStream { plaintext_len: usize, body_tag: [u8; TAG_LEN] },
}

impl Header {
    fn plaintext_len(&self) -> usize {
        match self {
            Header::Compact { plaintext_len } => *plaintext_len,
            Header::BoxStream { plaintext_len, .. } => *plaintext_len,
        }
    }
}

/// Encrypts a sequence of messages into records, advancing the sending
/// nonce per record.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Encryptor {
    key: SessionKey,
    nonce: Nonce,
    #[zeroize(skip)]
    framing: Framing,
}

impl Encryptor {
    /// Construct from an explicit key and starting nonce.
    pub fn new(key: SessionKey, nonce: Nonce, framing: Framing) -> Self {
        Self { key, nonce, framing }
    }

    /// Construct from a session's sending direction. The session's key
    /// material is copied; the encryptor owns its nonce state independently.
    pub fn from_session(session: &Session, framing: Framing) -> Self {
        Self::new(session.encryption_key, session.encryption_nonce, framing)
    }

    /// The framing this encryptor writes.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// The on-wire size of a record carrying `plaintext_len` bytes.
    pub fn encrypted_size(&self, plaintext_len: usize) -> usize {
        self.framing.encrypted_size(plaintext_len)
    }

    /// The nonce the next record will be sealed with.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Encrypt one message into `out`, returning the record length.
    ///
    /// Fails with `OutTooSmall` if `out` cannot hold
    /// [`encrypted_size`](Self::encrypted_size) bytes, and `ProtocolError`
    /// for messages over [`MAX_RECORD_LEN`]. The nonce advances only on
    /// success.
    pub fn encrypt(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        let n = plaintext.len();
        if n > MAX_RECORD_LEN {
            return Err(Error::ProtocolError);
        }
        if out.len() < self.encrypted_size(n) {
            return Err(Error::OutTooSmall);
        }
        let offset = self.framing.body_offset();
        out[offset..offset + n].copy_from_slice(plaintext);
        self.seal_positioned(out, n)
    }

    /// Encrypt one message within a single buffer: the plaintext occupies
    /// `buffer[..plaintext_len]` on entry and the record occupies
    /// `buffer[..returned]` on exit.
    pub fn encrypt_in_place(
        &mut self,
        buffer: &mut [u8],
        plaintext_len: usize,
    ) -> Result<usize, Error> {
        if plaintext_len > MAX_RECORD_LEN || plaintext_len > buffer.len() {
            return Err(Error::ProtocolError);
        }
        if buffer.len() < self.encrypted_size(plaintext_len) {
            return Err(Error::OutTooSmall);
        }
        buffer.copy_within(..plaintext_len, self.framing.body_offset());
        self.seal_positioned(buffer, plaintext_len)
    }

    /// Seal a record whose plaintext already sits at the body offset.
    fn seal_positioned(&mut self, buffer: &mut [u8], n: usize) -> Result<usize, Error> {
        let len_be = (n as u16).to_be_bytes();
        match self.framing {
            Framing::Compact => {
                let body = &mut buffer[HEADER_LEN..HEADER_LEN + n];
                let tag = secretbox::seal_detached(&self.key, self.nonce.as_bytes(), body)?;
                buffer[..LEN_LEN].copy_from_slice(&len_be);
                buffer[LEN_LEN..HEADER_LEN].copy_from_slice(&tag);
                self.nonce.increment();
            }
            Framing::BoxStream => {
                let body = &mut buffer[BOXED_HEADER_LEN..BOXED_HEADER_LEN + n];
                let body_tag = secretbox::seal_detached(&self.key, self.nonce.as_bytes(), body)?;

                let mut header = [0u8; HEADER_LEN];
                header[..LEN_LEN].copy_from_slice(&len_be);
                header[LEN_LEN..].copy_from_slice(&body_tag);

                let mut header_nonce = self.nonce;
                header_nonce.increment();
                let header_tag =
                    secretbox::seal_detached(&self.key, header_nonce.as_bytes(), &mut header)?;
                buffer[..TAG_LEN].copy_from_slice(&header_tag);
                buffer[TAG_LEN..BOXED_HEADER_LEN].copy_from_slice(&header);

                self.nonce.increment();
                self.nonce.increment();
            }
        }
        Ok(self.encrypted_size(n))
    }
}

/// Decrypts whole records in the order they were encrypted, advancing the
/// receiving nonce per record.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Decryptor {
    key: SessionKey,
    nonce: Nonce,
    #[zeroize(skip)]
    framing: Framing,
}

impl Decryptor {
    /// Construct from an explicit key and starting nonce.
    pub fn new(key: SessionKey, nonce: Nonce, framing: Framing) -> Self {
        Self { key, nonce, framing }
    }

    /// Construct from a session's receiving direction. The session's key
    /// material is copied; the decryptor owns its nonce state independently.
    pub fn from_session(session: &Session, framing: Framing) -> Self {
        Self::new(session.decryption_key, session.decryption_nonce, framing)
    }

    /// The framing this decryptor expects.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// The on-wire size of a record carrying `plaintext_len` bytes.
    pub fn encrypted_size(&self, plaintext_len: usize) -> usize {
        self.framing.encrypted_size(plaintext_len)
    }

    /// The nonce the next record is expected to have been sealed with.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// The size the next record will decrypt to, given the first bytes of
    /// the inbound stream. Pure: the nonce does not advance.
    ///
    /// Returns `IncompleteInput` until enough bytes are present to read the
    /// length (2 bytes for `Compact`; the full 34-byte sealed header for
    /// `BoxStream`), and `CorruptData` if a `BoxStream` header fails to
    /// open.
    pub fn decrypted_size(&self, input: &[u8]) -> Result<usize, Error> {
        self.parse_header(input).map(|h| h.plaintext_len())
    }

    /// Decrypt exactly one record from the front of `input` into `out`.
    ///
    /// Returns `(consumed, plaintext_len)`: the record's on-wire size and
    /// the bytes written to `out`. `IncompleteInput` means `input` does not
    /// yet hold a whole record; nothing is consumed and no state changes.
    /// On any error the nonce is left unadvanced.
    pub fn decrypt(&mut self, input: &[u8], out: &mut [u8]) -> Result<(usize, usize), Error> {
        let header = self.parse_header(input)?;
        let n = header.plaintext_len();
        let total = self.encrypted_size(n);
        if input.len() < total {
            return Err(Error::IncompleteInput);
        }
        if out.len() < n {
            return Err(Error::OutTooSmall);
        }
        let tag = body_tag(&header, input)?;
        out[..n].copy_from_slice(&input[self.framing.body_offset()..total]);
        secretbox::open_detached(&self.key, self.nonce.as_bytes(), &tag, &mut out[..n])?;
        self.advance_nonce();
        Ok((total, n))
    }

    /// Decrypt one record within a single buffer: the record starts at
    /// `buffer[0]` with `input_len` valid bytes, and the plaintext occupies
    /// `buffer[..plaintext_len]` on exit. Returns `(consumed,
    /// plaintext_len)`.
    pub fn decrypt_in_place(
        &mut self,
        buffer: &mut [u8],
        input_len: usize,
    ) -> Result<(usize, usize), Error> {
        let input_len = input_len.min(buffer.len());
        let header = self.parse_header(&buffer[..input_len])?;
        let n = header.plaintext_len();
        let total = self.encrypted_size(n);
        if input_len < total {
            return Err(Error::IncompleteInput);
        }
        let offset = self.framing.body_offset();
        let tag = body_tag(&header, &buffer[..input_len])?;
        secretbox::open_detached(&self.key, self.nonce.as_bytes(), &tag, &mut buffer[offset..total])?;
        self.advance_nonce();
        buffer.copy_within(offset..offset + n, 0);
        Ok((total, n))
    }

    /// Parse (and for BoxStream, open) the record header at the front of
    /// `input` without touching the receiving nonce.
    fn parse_header(&self, input: &[u8]) -> Result<Header, Error> {
        match self.framing {
            Framing::Compact => {
                if input.len() < LEN_LEN {
                    return Err(Error::IncompleteInput);
                }
                let len_be = [input[0], input[1]];
                Ok(Header::Compact {
                    plaintext_len: u16::from_be_bytes(len_be) as usize,
                })
            }
            Framing::BoxStream => {
                if input.len() < BOXED_HEADER_LEN {
                    return Err(Error::IncompleteInput);
                }
                let header_tag: [u8; TAG_LEN] = input[..TAG_LEN]
                    .try_into()
                    .map_err(|_| Error::CorruptData)?;
                let mut header: [u8; HEADER_LEN] = input[TAG_LEN..BOXED_HEADER_LEN]
                    .try_into()
                    .map_err(|_| Error::CorruptData)?;

                // The header was sealed second on the sending side, with
                // the nonce one past the body's.
                let mut header_nonce = self.nonce;
                header_nonce.increment();
                secretbox::open_detached(
                    &self.key,
                    header_nonce.as_bytes(),
                    &header_tag,
                    &mut header,
                )?;

                let len_be = [header[0], header[1]];
                let mut body_tag = [0u8; TAG_LEN];
                body_tag.copy_from_slice(&header[LEN_LEN..]);
                Ok(Header::BoxStream {
                    plaintext_len: u16::from_be_bytes(len_be) as usize,
                    body_tag,
                })
            }
        }
    }

    /// Advance the receiving nonce past one record.
    fn advance_nonce(&mut self) {
        self.nonce.increment();
        if self.framing == Framing::BoxStream {
            // The header consumed a second nonce on the sending side.
            self.nonce.increment();
        }
    }
}

/// The Poly1305 tag authenticating a record's body: inline in the wire
/// header for `Compact`, inside the opened header for `BoxStream`.
fn body_tag(header: &Header, input: &[u8]) -> Result<[u8; TAG_LEN], Error> {
    match header {
        Header::Compact { .. } => input[LEN_LEN..HEADER_LEN]
            .try_into()
            .map_err(|_| Error::CorruptData),
        Header::BoxStream { body_tag, .. } => Ok(*body_tag),
    }
}
