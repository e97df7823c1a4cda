//! The cryptographic core of the four-message exchange.
//!
//! Message math follows the Secret Handshake design: the client (A) and
//! server (B) hold long-term Ed25519 identities, generate ephemeral X25519
//! keys, and accumulate three shared secrets as the exchange progresses:
//!
//! - `ee`: ephemeral × ephemeral
//! - `es`: client ephemeral × server long-term
//! - `se`: client long-term × server ephemeral
//!
//! ```text
//! 1. client challenge:  hmac[K](client_eph_pub) ‖ client_eph_pub
//! 2. server challenge:  hmac[K](server_eph_pub) ‖ server_eph_pub
//! 3. client auth:       box[sha256(K ‖ ee ‖ es)](H)
//!                       where H = sign[A](K ‖ B_pub ‖ sha256(ee)) ‖ A_pub
//! 4. server ack:        box[sha256(K ‖ ee ‖ es ‖ se)](sign[B](K ‖ H ‖ sha256(ee)))
//! ```
//!
//! `K` is the 32-byte application ID. Each box key is used once, so the
//! boxes use an all-zero nonce. Long-term keys enter the DH operations in
//! their X25519 (Montgomery) form.

use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::crypto::hash::{self, HASH_LEN, MAC_LEN};
use crate::crypto::secretbox::{self, TAG_LEN, ZERO_NONCE};
use crate::crypto::x25519::{self, SharedSecret, DH_LEN};
use crate::error::Error;
use crate::keys::{AppId, PublicKey, SecretKey, SIGNATURE_LEN};
use crate::session::{Nonce, Session, NONCE_LEN};

/// Wire size of a challenge message: HMAC tag followed by an ephemeral key.
pub(crate) const CHALLENGE_LEN: usize = MAC_LEN + DH_LEN; // 64

/// Wire size of the client-auth message: a boxed identity proof.
pub(crate) const CLIENT_AUTH_LEN: usize = TAG_LEN + PROOF_LEN; // 112

/// Wire size of the server-ack message: a boxed signature.
pub(crate) const SERVER_ACK_LEN: usize = TAG_LEN + SIGNATURE_LEN; // 80

/// The client's identity proof: signature followed by its long-term key.
const PROOF_LEN: usize = SIGNATURE_LEN + PublicKey::LEN; // 96

/// Accumulated cryptographic state for one side of the exchange.
///
/// Methods must be called in protocol order; each returns `ProtocolError`
/// if a prerequisite has not been established and `CorruptData` if
/// verification fails. The driver in [`crate::handshake`] enforces ordering
/// and poisons itself on any error.
pub(crate) struct Exchange {
    app_id: AppId,
    local_key: SecretKey,
    local_public: PublicKey,
    eph_secret: StaticSecret,
    eph_public: [u8; DH_LEN],

    // Learned (server) or configured (client) as the exchange progresses.
    remote_public: Option<PublicKey>,
    remote_eph_public: Option<[u8; DH_LEN]>,
    secret_ee: Option<SharedSecret>,
    hash_ee: Option<Zeroizing<[u8; HASH_LEN]>>,
    secret_es: Option<SharedSecret>,
    secret_se: Option<SharedSecret>,
    ack_key: Option<Zeroizing<[u8; HASH_LEN]>>,
    proof: Option<[u8; PROOF_LEN]>,
}

impl Exchange {
    pub(crate) fn new(app_id: AppId, key: SecretKey, rng: &mut impl CryptoRngCore) -> Self {
        let (eph_secret, eph_public) = x25519::generate_keypair(rng);
        let local_public = key.public_key();
        Self {
            app_id,
            local_key: key,
            local_public,
            eph_secret,
            eph_public,
            remote_public: None,
            remote_eph_public: None,
            secret_ee: None,
            hash_ee: None,
            secret_es: None,
            secret_se: None,
            ack_key: None,
            proof: None,
        }
    }

    /// Record the server's long-term public key (client side, before step 3).
    pub(crate) fn set_remote_public(&mut self, public: PublicKey) {
        self.remote_public = Some(public);
    }

    /// The peer's long-term public key, once configured or learned.
    pub(crate) fn remote_public(&self) -> Option<PublicKey> {
        self.remote_public
    }

    // ===== Steps 1 & 2: challenges (identical for both directions) =====

    /// Build this side's challenge: `hmac[K](eph_pub) ‖ eph_pub`.
    pub(crate) fn create_challenge(&self) -> [u8; CHALLENGE_LEN] {
        let mut out = [0u8; CHALLENGE_LEN];
        let tag = hash::hmac(self.app_id.as_bytes(), &self.eph_public);
        out[..MAC_LEN].copy_from_slice(&tag);
        out[MAC_LEN..].copy_from_slice(&self.eph_public);
        out
    }

    /// Verify the peer's challenge and derive the ephemeral shared secret.
    pub(crate) fn verify_challenge(&mut self, challenge: &[u8]) -> Result<(), Error> {
        if challenge.len() != CHALLENGE_LEN {
            return Err(Error::ProtocolError);
        }
        let (tag, peer_eph) = challenge.split_at(MAC_LEN);
        let expected = hash::hmac(self.app_id.as_bytes(), peer_eph);
        if !bool::from(tag.ct_eq(&expected)) {
            return Err(Error::CorruptData);
        }

        let peer_eph: [u8; DH_LEN] = peer_eph.try_into().map_err(|_| Error::ProtocolError)?;
        let ee = x25519::dh(&self.eph_secret, &peer_eph)?;
        self.hash_ee = Some(Zeroizing::new(hash::sha256(ee.as_bytes())));
        self.secret_ee = Some(ee);
        self.remote_eph_public = Some(peer_eph);
        Ok(())
    }

    // ===== Step 3: client auth =====

    /// Build the client-auth message: `box[sha256(K ‖ ee ‖ es)](H)`.
    pub(crate) fn create_client_auth(&mut self) -> Result<[u8; CLIENT_AUTH_LEN], Error> {
        let server_public = self.remote_public.ok_or(Error::ProtocolError)?;
        let server_eph = self.remote_eph_public.ok_or(Error::ProtocolError)?;
        let hash_ee = self.hash_ee.as_ref().ok_or(Error::ProtocolError)?;

        // H = sign[A](K ‖ B_pub ‖ sha256(ee)) ‖ A_pub
        let message = identity_message(&self.app_id, &server_public, hash_ee);
        let signature = self.local_key.sign(&message);
        let mut proof = [0u8; PROOF_LEN];
        proof[..SIGNATURE_LEN].copy_from_slice(&signature);
        proof[SIGNATURE_LEN..].copy_from_slice(self.local_public.as_bytes());
        self.proof = Some(proof);

        self.secret_se = Some(x25519::dh(
            &self.local_key.key_agreement_secret(),
            &server_eph,
        )?);
        self.secret_es = Some(x25519::dh(
            &self.eph_secret,
            &server_public.key_agreement_public()?,
        )?);

        let key = self.auth_key()?;
        let mut out = [0u8; CLIENT_AUTH_LEN];
        secretbox::seal(&key, &ZERO_NONCE, &proof, &mut out)?;
        Ok(out)
    }

    /// Open and verify the client-auth message, learning the client identity.
    pub(crate) fn verify_client_auth(&mut self, auth: &[u8]) -> Result<(), Error> {
        if auth.len() != CLIENT_AUTH_LEN {
            return Err(Error::ProtocolError);
        }
        let client_eph = self.remote_eph_public.ok_or(Error::ProtocolError)?;

        // es on the server side is B × client_eph (equal to a × B_pub).
        self.secret_es = Some(x25519::dh(
            &self.local_key.key_agreement_secret(),
            &client_eph,
        )?);

        let key = self.auth_key()?;
        let mut proof = [0u8; PROOF_LEN];
        secretbox::open(&key, &ZERO_NONCE, auth, &mut proof)?;

        let (signature, client_public) = proof.split_at(SIGNATURE_LEN);
        let signature: [u8; SIGNATURE_LEN] =
            signature.try_into().map_err(|_| Error::ProtocolError)?;
        let client_public = PublicKey::from_bytes(
            client_public.try_into().map_err(|_| Error::ProtocolError)?,
        );

        // se on the server side is b × A_pub (equal to A × b_pub).
        self.secret_se = Some(x25519::dh(
            &self.eph_secret,
            &client_public.key_agreement_public()?,
        )?);

        let hash_ee = self.hash_ee.as_ref().ok_or(Error::ProtocolError)?;
        let message = identity_message(&self.app_id, &self.local_public, hash_ee);
        client_public.verify(&message, &signature)?;

        self.remote_public = Some(client_public);
        self.proof = Some(proof);
        Ok(())
    }

    // ===== Step 4: server ack =====

    /// Build the server-ack: `box[sha256(K ‖ ee ‖ es ‖ se)](sign[B](K ‖ H ‖ sha256(ee)))`.
    pub(crate) fn create_server_ack(&mut self) -> Result<[u8; SERVER_ACK_LEN], Error> {
        let proof = self.proof.ok_or(Error::ProtocolError)?;
        let hash_ee = self.hash_ee.as_ref().ok_or(Error::ProtocolError)?;

        let message = ack_message(&self.app_id, &proof, hash_ee);
        let signature = self.local_key.sign(&message);

        let key = self.ack_key()?;
        let mut out = [0u8; SERVER_ACK_LEN];
        secretbox::seal(&key, &ZERO_NONCE, &signature, &mut out)?;
        Ok(out)
    }

    /// Open the server-ack and verify it binds the expected server identity.
    pub(crate) fn verify_server_ack(&mut self, ack: &[u8]) -> Result<(), Error> {
        if ack.len() != SERVER_ACK_LEN {
            return Err(Error::ProtocolError);
        }
        let key = self.ack_key()?;
        let mut signature = [0u8; SIGNATURE_LEN];
        secretbox::open(&key, &ZERO_NONCE, ack, &mut signature)?;

        let server_public = self.remote_public.ok_or(Error::ProtocolError)?;
        let proof = self.proof.ok_or(Error::ProtocolError)?;
        let hash_ee = self.hash_ee.as_ref().ok_or(Error::ProtocolError)?;
        let message = ack_message(&self.app_id, &proof, hash_ee);
        server_public.verify(&message, &signature)
    }

    // ===== Outcome =====

    /// Derive the session keys, nonces, and peer identity.
    ///
    /// Valid only after the final message has been created (server) or
    /// verified (client).
    pub(crate) fn session(&self) -> Result<Session, Error> {
        let ack_key = self.ack_key.as_ref().ok_or(Error::ProtocolError)?;
        let peer_public = self.remote_public.ok_or(Error::ProtocolError)?;
        let peer_eph = self.remote_eph_public.ok_or(Error::ProtocolError)?;

        let key_root = hash::sha256(&ack_key[..]);
        Ok(Session {
            encryption_key: hash::sha256_parts(&[&key_root, peer_public.as_bytes()]),
            encryption_nonce: initial_nonce(&self.app_id, &peer_eph),
            decryption_key: hash::sha256_parts(&[&key_root, self.local_public.as_bytes()]),
            decryption_nonce: initial_nonce(&self.app_id, &self.eph_public),
            peer_public_key: peer_public,
        })
    }

    // ===== Derived box keys =====

    /// `sha256(K ‖ ee ‖ es)`, sealing the client-auth box.
    fn auth_key(&self) -> Result<Zeroizing<[u8; HASH_LEN]>, Error> {
        let ee = self.secret_ee.as_ref().ok_or(Error::ProtocolError)?;
        let es = self.secret_es.as_ref().ok_or(Error::ProtocolError)?;
        Ok(Zeroizing::new(hash::sha256_parts(&[
            self.app_id.as_bytes(),
            ee.as_bytes(),
            es.as_bytes(),
        ])))
    }

    /// `sha256(K ‖ ee ‖ es ‖ se)`, sealing the server-ack box.
    ///
    /// Cached: it doubles as the root of the session-key derivation.
    fn ack_key(&mut self) -> Result<Zeroizing<[u8; HASH_LEN]>, Error> {
        let ee = self.secret_ee.as_ref().ok_or(Error::ProtocolError)?;
        let es = self.secret_es.as_ref().ok_or(Error::ProtocolError)?;
        let se = self.secret_se.as_ref().ok_or(Error::ProtocolError)?;
        let key = Zeroizing::new(hash::sha256_parts(&[
            self.app_id.as_bytes(),
            ee.as_bytes(),
            es.as_bytes(),
            se.as_bytes(),
        ]));
        self.ack_key = Some(key.clone());
        Ok(key)
    }
}

/// `K ‖ pk ‖ sha256(ee)`: the message the client signs in step 3.
fn identity_message(
    app_id: &AppId,
    public: &PublicKey,
    hash_ee: &[u8; HASH_LEN],
) -> [u8; AppId::LEN + PublicKey::LEN + HASH_LEN] {
    let mut message = [0u8; AppId::LEN + PublicKey::LEN + HASH_LEN];
    message[..AppId::LEN].copy_from_slice(app_id.as_bytes());
    message[AppId::LEN..AppId::LEN + PublicKey::LEN].copy_from_slice(public.as_bytes());
    message[AppId::LEN + PublicKey::LEN..].copy_from_slice(hash_ee);
    message
}

/// `K ‖ H ‖ sha256(ee)`: the message the server signs in step 4.
fn ack_message(
    app_id: &AppId,
    proof: &[u8; PROOF_LEN],
    hash_ee: &[u8; HASH_LEN],
) -> [u8; AppId::LEN + PROOF_LEN + HASH_LEN] {
    let mut message = [0u8; AppId::LEN + PROOF_LEN + HASH_LEN];
    message[..AppId::LEN].copy_from_slice(app_id.as_bytes());
    message[AppId::LEN..AppId::LEN + PROOF_LEN].copy_from_slice(proof);
    message[AppId::LEN + PROOF_LEN..].copy_from_slice(hash_ee);
    message
}

/// The first 24 bytes of `hmac[K](eph_pub)`: the initial record nonce for
/// the direction keyed to that ephemeral key.
fn initial_nonce(app_id: &AppId, eph_public: &[u8; DH_LEN]) -> Nonce {
    let tag = hash::hmac(app_id.as_bytes(), eph_public);
    let mut bytes = [0u8; NONCE_LEN];
    bytes.copy_from_slice(&tag[..NONCE_LEN]);
    Nonce::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Exchange, Exchange, SecretKey, SecretKey) {
        let client_key = SecretKey::generate();
        let server_key = SecretKey::generate();
        let app_id = AppId::from_str_padded("exchange tests");

        let mut client = Exchange::new(app_id, client_key.clone(), &mut rand_core::OsRng);
        client.set_remote_public(server_key.public_key());
        let server = Exchange::new(app_id, server_key.clone(), &mut rand_core::OsRng);
        (client, server, client_key, server_key)
    }

    #[test]
    fn full_exchange_yields_matching_sessions() {
        let (mut client, mut server, client_key, server_key) = pair();

        server.verify_challenge(&client.create_challenge()).unwrap();
        client.verify_challenge(&server.create_challenge()).unwrap();
        let auth = client.create_client_auth().unwrap();
        server.verify_client_auth(&auth).unwrap();
        let ack = server.create_server_ack().unwrap();
        client.verify_server_ack(&ack).unwrap();

        let client_session = client.session().unwrap();
        let server_session = server.session().unwrap();

        assert_eq!(client_session.encryption_key, server_session.decryption_key);
        assert_eq!(client_session.decryption_key, server_session.encryption_key);
        assert_eq!(
            client_session.encryption_nonce,
            server_session.decryption_nonce
        );
        assert_eq!(
            client_session.decryption_nonce,
            server_session.encryption_nonce
        );
        assert_eq!(client_session.peer_public_key, server_key.public_key());
        assert_eq!(server_session.peer_public_key, client_key.public_key());
    }

    #[test]
    fn challenge_with_wrong_app_id_is_rejected() {
        let (client, _, _, server_key) = pair();
        let mut server = Exchange::new(
            AppId::from_str_padded("a different app"),
            server_key,
            &mut rand_core::OsRng,
        );
        let result = server.verify_challenge(&client.create_challenge());
        assert_eq!(result, Err(Error::CorruptData));
    }

    #[test]
    fn tampered_challenge_is_rejected() {
        let (client, mut server, _, _) = pair();
        let mut challenge = client.create_challenge();
        challenge[3] ^= 0x01;
        assert_eq!(
            server.verify_challenge(&challenge),
            Err(Error::CorruptData)
        );
    }

    #[test]
    fn auth_against_wrong_server_key_is_rejected() {
        let (_, mut server, client_key, server_key) = pair();

        // Client configured with a near-miss server key.
        let mut bad = *server_key.public_key().as_bytes();
        bad[17] = bad[17].wrapping_add(1);
        let mut client = Exchange::new(
            AppId::from_str_padded("exchange tests"),
            client_key,
            &mut rand_core::OsRng,
        );
        client.set_remote_public(PublicKey::from_bytes(bad));

        server.verify_challenge(&client.create_challenge()).unwrap();
        client.verify_challenge(&server.create_challenge()).unwrap();

        // The client derives es against the wrong key, so its box cannot
        // open on the server (or the key conversion already fails).
        match client.create_client_auth() {
            Ok(auth) => {
                assert_eq!(server.verify_client_auth(&auth), Err(Error::CorruptData));
            }
            Err(err) => assert_eq!(err, Error::CorruptData),
        }
    }

    #[test]
    fn truncated_client_auth_is_rejected() {
        let (mut client, mut server, _, _) = pair();
        server.verify_challenge(&client.create_challenge()).unwrap();
        client.verify_challenge(&server.create_challenge()).unwrap();
        let auth = client.create_client_auth().unwrap();
        assert_eq!(
            server.verify_client_auth(&auth[..64]),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn session_before_completion_is_unavailable() {
        let (client, _, _, _) = pair();
        assert!(matches!(client.session(), Err(Error::ProtocolError)));
    }
}
