//! Byte-oriented stream adapters over the record codec.
//!
//! [`EncryptionStream`]: push cleartext in, pull ciphertext records out.
//! [`DecryptionStream`]: push ciphertext from the network in, pull cleartext
//! out. Push and pull never have to keep pace with each other, and inbound
//! chunks may split records at arbitrary byte boundaries; both sides buffer
//! as needed.

use crate::error::Error;
use crate::record::{Decryptor, Encryptor, Framing, MAX_RECORD_LEN};
use crate::session::Session;

/// Processed-bytes-then-pending single-buffer layout shared by the two
/// stream adapters: `data[..processed]` is ready to pull, the tail is
/// material still awaiting encryption or decryption.
struct StreamBuffer {
    data: Vec<u8>,
    processed: usize,
}

impl StreamBuffer {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            processed: 0,
        }
    }

    /// Bytes awaiting encryption/decryption at the tail.
    fn pending(&self) -> usize {
        self.data.len() - self.processed
    }

    /// Processed bytes ready to pull, without copying.
    fn available(&self) -> &[u8] {
        &self.data[..self.processed]
    }

    /// Copy up to `dst.len()` processed bytes into `dst` and consume them.
    fn pull(&mut self, dst: &mut [u8]) -> usize {
        let n = self.processed.min(dst.len());
        dst[..n].copy_from_slice(&self.data[..n]);
        self.skip(n)
    }

    /// Drop up to `max` processed bytes from the front of the buffer.
    fn skip(&mut self, max: usize) -> usize {
        let n = self.processed.min(max);
        if n > 0 {
            self.data.drain(..n);
            self.processed -= n;
        }
        n
    }
}

/// Stream-oriented adapter for the sending direction of a [`Session`].
///
/// Cleartext accumulates via [`push_partial`](Self::push_partial) and is cut
/// into one record per [`flush`](Self::flush); [`push`](Self::push) does
/// both at once. Ciphertext is then available to [`pull`](Self::pull).
pub struct EncryptionStream {
    encryptor: Encryptor,
    buffer: StreamBuffer,
}

impl EncryptionStream {
    /// Construct over a session's sending keys.
    pub fn new(session: &Session, framing: Framing) -> Self {
        Self::from_encryptor(Encryptor::from_session(session, framing))
    }

    /// Construct over an existing record encryptor.
    pub fn from_encryptor(encryptor: Encryptor) -> Self {
        Self {
            encryptor,
            buffer: StreamBuffer::new(),
        }
    }

    /// Encrypt `data` as one record (after any pending cleartext). The
    /// ciphertext is then available to pull.
    pub fn push(&mut self, data: &[u8]) -> Result<(), Error> {
        self.push_partial(data)?;
        self.flush()
    }

    /// Append cleartext without encrypting it yet. Call any number of
    /// times, then [`flush`](Self::flush).
    ///
    /// Pending cleartext only grows to the maximum record size; beyond that
    /// full-size records are flushed automatically.
    pub fn push_partial(&mut self, mut data: &[u8]) -> Result<(), Error> {
        while !data.is_empty() {
            let room = MAX_RECORD_LEN - self.buffer.pending();
            let take = data.len().min(room);
            self.buffer.data.extend_from_slice(&data[..take]);
            data = &data[take..];
            if !data.is_empty() {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Encrypt all cleartext buffered by `push_partial` as one record.
    /// A no-op when nothing is pending.
    pub fn flush(&mut self) -> Result<(), Error> {
        let pending = self.buffer.pending();
        if pending == 0 {
            return Ok(());
        }
        let record_len = self.encryptor.encrypted_size(pending);
        self.buffer.data.resize(self.buffer.processed + record_len, 0);
        let region = &mut self.buffer.data[self.buffer.processed..];
        let written = self.encryptor.encrypt_in_place(region, pending)?;
        self.buffer.processed += written;
        self.buffer.data.truncate(self.buffer.processed);
        Ok(())
    }

    /// Ciphertext bytes ready to transmit.
    pub fn bytes_available(&self) -> usize {
        self.buffer.processed
    }

    /// The ready ciphertext, without copying. Invalidated by any push; call
    /// [`skip`](Self::skip) once the bytes are handed to the channel.
    pub fn available_data(&self) -> &[u8] {
        self.buffer.available()
    }

    /// Copy up to `dst.len()` ciphertext bytes into `dst`, consuming them.
    /// Returns the number of bytes copied, which may be 0.
    pub fn pull(&mut self, dst: &mut [u8]) -> usize {
        self.buffer.pull(dst)
    }

    /// Drop up to `max` ready ciphertext bytes, as if pulled. Usually
    /// called after [`available_data`](Self::available_data).
    pub fn skip(&mut self, max: usize) -> usize {
        self.buffer.skip(max)
    }
}

/// Stream-oriented adapter for the receiving direction of a [`Session`].
///
/// Push ciphertext chunks of any size; whole records are decrypted as they
/// complete and their cleartext becomes available to pull. A record that
/// fails authentication poisons the stream: the push reporting it and every
/// later one fail, and no further cleartext is produced.
pub struct DecryptionStream {
    decryptor: Decryptor,
    buffer: StreamBuffer,
    poisoned: bool,
}

impl DecryptionStream {
    /// Construct over a session's receiving keys.
    pub fn new(session: &Session, framing: Framing) -> Self {
        Self::from_decryptor(Decryptor::from_session(session, framing))
    }

    /// Construct over an existing record decryptor.
    pub fn from_decryptor(decryptor: Decryptor) -> Self {
        Self {
            decryptor,
            buffer: StreamBuffer::new(),
            poisoned: false,
        }
    }

    /// Add ciphertext received from the peer, decrypting every complete
    /// record it finishes. Partial records are buffered until their
    /// remaining bytes arrive; this never blocks progress.
    pub fn push(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.poisoned {
            return Err(Error::CorruptData);
        }
        self.buffer.data.extend_from_slice(data);
        loop {
            let pending = self.buffer.pending();
            let start = self.buffer.processed;
            let region = &mut self.buffer.data[start..];
            match self.decryptor.decrypt_in_place(region, pending) {
                Ok((consumed, produced)) => {
                    // Decrypting shortened the data; cut the framing bytes
                    // out of the buffer.
                    self.buffer.data.drain(start + produced..start + consumed);
                    self.buffer.processed += produced;
                }
                Err(Error::IncompleteInput) => return Ok(()),
                Err(err) => {
                    self.poisoned = true;
                    return Err(err);
                }
            }
        }
    }

    /// Cleartext bytes ready to pull.
    pub fn bytes_available(&self) -> usize {
        self.buffer.processed
    }

    /// The ready cleartext, without copying. Invalidated by any push; call
    /// [`skip`](Self::skip) for the bytes consumed.
    pub fn available_data(&self) -> &[u8] {
        self.buffer.available()
    }

    /// Copy up to `dst.len()` cleartext bytes into `dst`, consuming them.
    /// Returns the number of bytes copied, which may be 0.
    pub fn pull(&mut self, dst: &mut [u8]) -> usize {
        self.buffer.pull(dst)
    }

    /// Drop up to `max` ready cleartext bytes, as if pulled.
    pub fn skip(&mut self, max: usize) -> usize {
        self.buffer.skip(max)
    }
}
