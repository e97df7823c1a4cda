use rand_core::{CryptoRngCore, OsRng};

use crate::error::Error;
use crate::exchange::{Exchange, CHALLENGE_LEN, CLIENT_AUTH_LEN, SERVER_ACK_LEN};
use crate::keys::{Context, PublicKey};
use crate::session::Session;

/// Which side of the connection this state machine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

/// Protocol steps in wire order. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ClientChallenge,
    ServerChallenge,
    ClientAuth,
    ServerAck,
    Finished,
    Failed,
}

impl Step {
    fn next(self) -> Step {
        match self {
            Step::ClientChallenge => Step::ServerChallenge,
            Step::ServerChallenge => Step::ClientAuth,
            Step::ClientAuth => Step::ServerAck,
            Step::ServerAck => Step::Finished,
            Step::Finished | Step::Failed => self,
        }
    }
}

/// Callback deciding whether a connecting client is acceptable.
type ClientAuthorizer = Box<dyn FnMut(&PublicKey) -> bool + Send>;

/// One side of the Secret Handshake protocol, driven by raw bytes.
///
/// The handshake is a strictly alternating four-message exchange; this type
/// tells the caller whose turn it is and verifies each inbound message:
///
/// - When [`bytes_to_send`](Self::bytes_to_send) is non-empty, transmit it
///   and call [`send_completed`](Self::send_completed).
/// - When [`bytes_to_read`](Self::bytes_to_read) is non-empty, fill it with
///   exactly that many bytes from the channel and call
///   [`read_completed`](Self::read_completed).
///
/// At any time exactly one of the two directions is active. Once
/// [`finished`](Self::finished) is true, [`into_session`](Self::into_session)
/// yields the [`Session`]. Any verification failure poisons the machine:
/// both buffers go empty, `failed` stays true, and no session can be drawn.
pub struct Handshake {
    exchange: Exchange,
    role: Role,
    step: Step,
    input: Vec<u8>,
    output: Vec<u8>,
    authorizer: Option<ClientAuthorizer>,
}

impl Handshake {
    /// Create the client (initiating) side.
    ///
    /// The client must know the server's long-term public key up front; a
    /// wrong `server_public` makes the handshake fail at step 3 or 4.
    pub fn new_client(context: Context, server_public: PublicKey) -> Self {
        Self::new_client_with_rng(context, server_public, &mut OsRng)
    }

    /// Create the client side with a specific RNG (useful for testing).
    pub fn new_client_with_rng(
        context: Context,
        server_public: PublicKey,
        rng: &mut impl CryptoRngCore,
    ) -> Self {
        let mut exchange = Exchange::new(context.app_id, context.key, rng);
        exchange.set_remote_public(server_public);
        Self::new(exchange, Role::Client)
    }

    /// Create the server (accepting) side.
    ///
    /// The server learns the client's public key from the exchange.
    pub fn new_server(context: Context) -> Self {
        Self::new_server_with_rng(context, &mut OsRng)
    }

    /// Create the server side with a specific RNG (useful for testing).
    pub fn new_server_with_rng(context: Context, rng: &mut impl CryptoRngCore) -> Self {
        let exchange = Exchange::new(context.app_id, context.key, rng);
        Self::new(exchange, Role::Server)
    }

    fn new(exchange: Exchange, role: Role) -> Self {
        Self {
            exchange,
            role,
            step: Step::ClientChallenge,
            input: Vec::new(),
            output: Vec::new(),
            authorizer: None,
        }
    }

    /// Register a callback that decides whether a client may connect
    /// (server side). It receives the client's authenticated public key
    /// after step 3 verifies; returning `false` fails the handshake.
    pub fn set_client_authorizer(
        &mut self,
        authorizer: impl FnMut(&PublicKey) -> bool + Send + 'static,
    ) {
        self.authorizer = Some(Box::new(authorizer));
    }

    /// Whether it is this side's turn to transmit.
    fn sending(&self) -> bool {
        matches!(
            (self.role, self.step),
            (Role::Client, Step::ClientChallenge | Step::ClientAuth)
                | (Role::Server, Step::ServerChallenge | Step::ServerAck)
        )
    }

    /// How many bytes this side is waiting to receive.
    fn bytes_needed(&self) -> usize {
        match (self.role, self.step) {
            (Role::Client, Step::ServerChallenge) => CHALLENGE_LEN,
            (Role::Client, Step::ServerAck) => SERVER_ACK_LEN,
            (Role::Server, Step::ClientChallenge) => CHALLENGE_LEN,
            (Role::Server, Step::ClientAuth) => CLIENT_AUTH_LEN,
            _ => 0,
        }
    }

    /// The bytes to transmit next, or empty if it is not this side's turn
    /// (or the handshake has failed or finished).
    pub fn bytes_to_send(&mut self) -> &[u8] {
        if !self.sending() {
            return &[];
        }
        if self.output.is_empty() {
            match self.fill_output() {
                Ok(message) => self.output = message,
                Err(_) => {
                    self.step = Step::Failed;
                    return &[];
                }
            }
        }
        &self.output
    }

    fn fill_output(&mut self) -> Result<Vec<u8>, Error> {
        match self.step {
            Step::ClientChallenge | Step::ServerChallenge => {
                Ok(self.exchange.create_challenge().to_vec())
            }
            Step::ClientAuth => Ok(self.exchange.create_client_auth()?.to_vec()),
            Step::ServerAck => Ok(self.exchange.create_server_ack()?.to_vec()),
            Step::Finished | Step::Failed => Err(Error::ProtocolError),
        }
    }

    /// Signal that the bytes from [`bytes_to_send`](Self::bytes_to_send)
    /// were handed to the channel. Advances to the next step.
    pub fn send_completed(&mut self) -> Result<(), Error> {
        if self.output.is_empty() {
            return Err(Error::ProtocolError);
        }
        self.output.clear();
        self.step = self.step.next();
        Ok(())
    }

    /// The buffer awaiting inbound bytes, or empty if it is not this side's
    /// turn to read. The caller must fill it completely, then call
    /// [`read_completed`](Self::read_completed).
    pub fn bytes_to_read(&mut self) -> &mut [u8] {
        let needed = self.bytes_needed();
        self.input.resize(needed, 0);
        &mut self.input
    }

    /// Verify the bytes placed in [`bytes_to_read`](Self::bytes_to_read).
    ///
    /// On success the machine advances; on verification failure it is
    /// poisoned and `Error::CorruptData` is returned.
    pub fn read_completed(&mut self) -> Result<(), Error> {
        let needed = self.bytes_needed();
        if needed == 0 || self.input.len() != needed {
            return Err(Error::ProtocolError);
        }
        let message = core::mem::take(&mut self.input);
        match self.verify_input(&message) {
            Ok(()) => {
                self.step = self.step.next();
                Ok(())
            }
            Err(err) => {
                self.step = Step::Failed;
                Err(err)
            }
        }
    }

    fn verify_input(&mut self, message: &[u8]) -> Result<(), Error> {
        match (self.role, self.step) {
            (Role::Server, Step::ClientChallenge) | (Role::Client, Step::ServerChallenge) => {
                self.exchange.verify_challenge(message)
            }
            (Role::Server, Step::ClientAuth) => {
                self.exchange.verify_client_auth(message)?;
                if let (Some(authorizer), Some(client)) =
                    (self.authorizer.as_mut(), self.exchange.remote_public())
                {
                    if !authorizer(&client) {
                        return Err(Error::ProtocolError);
                    }
                }
                Ok(())
            }
            (Role::Client, Step::ServerAck) => self.exchange.verify_server_ack(message),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Incremental alternative to `bytes_to_read` + `read_completed`: feed
    /// whatever was received from the peer; returns how many bytes were
    /// consumed. Verification runs automatically once a full message has
    /// accumulated.
    pub fn received_bytes(&mut self, src: &[u8]) -> Result<usize, Error> {
        if self.step == Step::Failed {
            return Err(Error::ProtocolError);
        }
        let needed = self.bytes_needed();
        if needed == 0 {
            return Ok(0);
        }
        let take = src.len().min(needed - self.input.len());
        self.input.extend_from_slice(&src[..take]);
        if self.input.len() == needed {
            self.read_completed()?;
        }
        Ok(take)
    }

    /// Incremental alternative to `bytes_to_send` + `send_completed`: copy
    /// pending output into `dst`, returning the number of bytes written.
    /// The step advances once the whole message has been drained.
    pub fn copy_bytes_to_send(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        if self.step == Step::Failed {
            return Err(Error::ProtocolError);
        }
        if self.output.is_empty() && self.bytes_to_send().is_empty() {
            return Ok(0);
        }
        let count = self.output.len().min(dst.len());
        dst[..count].copy_from_slice(&self.output[..count]);
        self.output.drain(..count);
        if self.output.is_empty() {
            self.step = self.step.next();
        }
        Ok(count)
    }

    /// Whether the handshake has failed. Terminal.
    pub fn failed(&self) -> bool {
        self.step == Step::Failed
    }

    /// Whether the handshake has completed successfully.
    pub fn finished(&self) -> bool {
        self.step == Step::Finished
    }

    /// Consume the completed handshake, yielding the session keys and the
    /// peer's authenticated identity.
    ///
    /// Returns `Error::ProtocolError` unless [`finished`](Self::finished).
    pub fn into_session(self) -> Result<Session, Error> {
        if self.step != Step::Finished {
            return Err(Error::ProtocolError);
        }
        self.exchange.session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{AppId, SecretKey};

    fn contexts() -> (Context, Context, PublicKey, PublicKey) {
        let client_key = SecretKey::generate();
        let server_key = SecretKey::generate();
        let client_public = client_key.public_key();
        let server_public = server_key.public_key();
        let app_id = AppId::from_str_padded("App");
        (
            Context::new(app_id, client_key),
            Context::new(app_id, server_key),
            client_public,
            server_public,
        )
    }

    /// One flight: `src` sends, `dst` receives, both sides advance.
    fn send_from_to(src: &mut Handshake, dst: &mut Handshake, expected: usize) {
        assert!(src.bytes_to_read().is_empty());
        assert!(dst.bytes_to_send().is_empty());

        let message = src.bytes_to_send().to_vec();
        assert_eq!(message.len(), expected);
        dst.bytes_to_read().copy_from_slice(&message);
        dst.read_completed().unwrap();
        src.send_completed().unwrap();
    }

    #[test]
    fn happy_path() {
        let (client_ctx, server_ctx, client_public, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);

        send_from_to(&mut client, &mut server, 64);
        send_from_to(&mut server, &mut client, 64);
        send_from_to(&mut client, &mut server, 112);
        send_from_to(&mut server, &mut client, 80);

        assert!(client.finished());
        assert!(server.finished());

        let client_session = client.into_session().unwrap();
        let server_session = server.into_session().unwrap();
        assert_eq!(client_session.encryption_key, server_session.decryption_key);
        assert_eq!(client_session.decryption_key, server_session.encryption_key);
        assert_eq!(client_session.peer_public_key, server_public);
        assert_eq!(server_session.peer_public_key, client_public);
    }

    #[test]
    fn wrong_server_key_fails_at_client_auth() {
        let (client_ctx, server_ctx, _, _) = contexts();
        // A valid key, but not the server's.
        let wrong_public = SecretKey::generate().public_key();
        let mut client = Handshake::new_client(client_ctx, wrong_public);
        let mut server = Handshake::new_server(server_ctx);

        send_from_to(&mut client, &mut server, 64);
        send_from_to(&mut server, &mut client, 64);

        // Step 3 still sends (the client uses its belief), but the server
        // cannot open the box.
        let auth = client.bytes_to_send().to_vec();
        assert_eq!(auth.len(), 112);
        server.bytes_to_read().copy_from_slice(&auth);
        assert_eq!(server.read_completed(), Err(Error::CorruptData));
        assert!(server.failed());
        assert!(server.bytes_to_send().is_empty());
        assert!(server.bytes_to_read().is_empty());
    }

    #[test]
    fn corrupt_challenge_fails_server() {
        let (client_ctx, server_ctx, _, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);

        let mut challenge = client.bytes_to_send().to_vec();
        challenge[0] ^= 0x01;
        server.bytes_to_read().copy_from_slice(&challenge);
        assert_eq!(server.read_completed(), Err(Error::CorruptData));
        assert!(server.failed());
        assert!(!server.finished());
    }

    #[test]
    fn alternation_is_strict() {
        let (client_ctx, server_ctx, _, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);

        // Client starts sending, server starts reading.
        assert!(!client.bytes_to_send().is_empty());
        assert!(client.bytes_to_read().is_empty());
        assert!(server.bytes_to_send().is_empty());
        assert!(!server.bytes_to_read().is_empty());

        // Completing the wrong direction is a protocol error.
        assert_eq!(client.read_completed(), Err(Error::ProtocolError));
        assert_eq!(server.send_completed(), Err(Error::ProtocolError));
    }

    #[test]
    fn incremental_io_drives_the_handshake() {
        let (client_ctx, server_ctx, _, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);

        // Pump byte-by-byte through the copy/received APIs until both
        // sides settle.
        let mut wire = [0u8; 1];
        loop {
            let mut progressed = false;
            while client.copy_bytes_to_send(&mut wire).unwrap() == 1 {
                assert_eq!(server.received_bytes(&wire).unwrap(), 1);
                progressed = true;
            }
            while server.copy_bytes_to_send(&mut wire).unwrap() == 1 {
                assert_eq!(client.received_bytes(&wire).unwrap(), 1);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        assert!(client.finished());
        assert!(server.finished());
    }

    #[test]
    fn authorizer_can_reject_client() {
        let (client_ctx, server_ctx, _, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);
        server.set_client_authorizer(|_| false);

        send_from_to(&mut client, &mut server, 64);
        send_from_to(&mut server, &mut client, 64);

        let auth = client.bytes_to_send().to_vec();
        server.bytes_to_read().copy_from_slice(&auth);
        assert_eq!(server.read_completed(), Err(Error::ProtocolError));
        assert!(server.failed());
    }

    #[test]
    fn authorizer_sees_the_client_key() {
        let (client_ctx, server_ctx, client_public, server_public) = contexts();
        let mut client = Handshake::new_client(client_ctx, server_public);
        let mut server = Handshake::new_server(server_ctx);
        server.set_client_authorizer(move |key| *key == client_public);

        send_from_to(&mut client, &mut server, 64);
        send_from_to(&mut server, &mut client, 64);
        send_from_to(&mut client, &mut server, 112);
        send_from_to(&mut server, &mut client, 80);
        assert!(server.finished());
    }

    #[test]
    fn session_unavailable_until_finished() {
        let (client_ctx, _, _, server_public) = contexts();
        let client = Handshake::new_client(client_ctx, server_public);
        assert!(matches!(client.into_session(), Err(Error::ProtocolError)));
    }
}
