//! Mutual challenge-response handshake.
//!
//! # States
//! ```text
//! Acceptor:  Init → ChallengeSent → ResponseReceived → ResponseSent → Authenticated
//! Initiator: Init → ChallengeReceived → ResponseSent → ResponseReceived → Authenticated
//! any error or deadline expiry                                        → Failed
//! ```
//!
//! # Exchange
//! ```text
//! acceptor  → {"type":"challenge","node_id":A,"challenge":c1}
//! initiator → {"type":"response","node_id":B,"response":R_B(c1),"challenge":c2}
//! acceptor  → {"type":"response","node_id":A,"response":R_A(c2)}
//! ```
//!
//! # Design Decisions
//! - One deadline bounds the whole exchange on both sides
//! - Each side only accepts answers to a challenge it generated itself
//! - The initiator checks that the proof comes from the id the challenge named

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::security::Authenticator;
use crate::transport::error::HandshakeError;
use crate::transport::frame::{write_frame, AuthKind, AuthMessage, FrameReader};

/// Which end of the socket we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted the socket; sends the first challenge.
    Acceptor,
    /// Dialed the socket; answers the first challenge.
    Initiator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Acceptor => "acceptor",
            Role::Initiator => "initiator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    ChallengeSent,
    ChallengeReceived,
    ResponseSent,
    ResponseReceived,
    Authenticated,
    Failed,
}

/// One handshake attempt over one raw socket.
#[derive(Debug)]
pub struct Handshake<'a> {
    auth: &'a Authenticator,
    role: Role,
    deadline: Duration,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    pub fn new(auth: &'a Authenticator, role: Role, deadline: Duration) -> Self {
        Self {
            auth,
            role,
            deadline,
            state: HandshakeState::Init,
        }
    }

    pub fn acceptor(auth: &'a Authenticator, deadline: Duration) -> Self {
        Self::new(auth, Role::Acceptor, deadline)
    }

    pub fn initiator(auth: &'a Authenticator, deadline: Duration) -> Self {
        Self::new(auth, Role::Initiator, deadline)
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Run the exchange to completion. Returns the authenticated peer id.
    ///
    /// On error the state is `Failed` and the socket must be dropped.
    pub async fn run<R, W>(&mut self, reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let deadline = self.deadline;
        let outcome = match tokio::time::timeout(deadline, self.exchange(reader, writer)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HandshakeError::Timeout(deadline)),
        };

        self.state = match outcome {
            Ok(_) => HandshakeState::Authenticated,
            Err(_) => HandshakeState::Failed,
        };
        outcome
    }

    async fn exchange<R, W>(&mut self, reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self.role {
            Role::Acceptor => self.accept(reader, writer).await,
            Role::Initiator => self.initiate(reader, writer).await,
        }
    }

    async fn accept<R, W>(&mut self, reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let challenge = self.auth.generate_challenge();
        write_frame(writer, &AuthMessage::challenge(self.auth.node_id(), challenge.as_str())).await?;
        self.state = HandshakeState::ChallengeSent;

        let reply: AuthMessage = read_auth(reader).await?;
        expect_kind(&reply, AuthKind::Response)?;
        self.state = HandshakeState::ResponseReceived;

        let peer_id = self.check_peer_id(&reply.node_id)?;
        let response = reply.response.as_deref().ok_or(HandshakeError::MissingField("response"))?;
        if !self.auth.verify_response(&peer_id, &challenge, response) {
            return Err(HandshakeError::ResponseMismatch { peer_id });
        }

        let counter = reply.challenge.as_deref().ok_or(HandshakeError::MissingField("challenge"))?;
        let proof = AuthMessage::response(self.auth.node_id(), self.auth.compute_response(counter), None);
        write_frame(writer, &proof).await?;
        self.state = HandshakeState::ResponseSent;

        Ok(peer_id)
    }

    async fn initiate<R, W>(&mut self, reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let offer: AuthMessage = read_auth(reader).await?;
        expect_kind(&offer, AuthKind::Challenge)?;
        self.state = HandshakeState::ChallengeReceived;

        let peer_id = self.check_peer_id(&offer.node_id)?;
        let challenge = offer.challenge.as_deref().ok_or(HandshakeError::MissingField("challenge"))?;

        let counter = self.auth.generate_challenge();
        let reply = AuthMessage::response(
            self.auth.node_id(),
            self.auth.compute_response(challenge),
            Some(counter.clone()),
        );
        write_frame(writer, &reply).await?;
        self.state = HandshakeState::ResponseSent;

        let proof: AuthMessage = read_auth(reader).await?;
        expect_kind(&proof, AuthKind::Response)?;
        self.state = HandshakeState::ResponseReceived;

        if proof.node_id != peer_id {
            return Err(HandshakeError::IdentityMismatch {
                claimed: peer_id,
                actual: proof.node_id,
            });
        }
        let response = proof.response.as_deref().ok_or(HandshakeError::MissingField("response"))?;
        if !self.auth.verify_response(&peer_id, &counter, response) {
            return Err(HandshakeError::ResponseMismatch { peer_id });
        }

        Ok(peer_id)
    }

    fn check_peer_id(&self, node_id: &str) -> Result<String, HandshakeError> {
        if node_id.is_empty() {
            return Err(HandshakeError::EmptyNodeId);
        }
        if node_id == self.auth.node_id() {
            return Err(HandshakeError::SelfConnection);
        }
        Ok(node_id.to_string())
    }
}

async fn read_auth<R, T>(reader: &mut FrameReader<R>) -> Result<T, HandshakeError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match reader.read_frame().await? {
        Some(Ok(frame)) => Ok(frame),
        Some(Err(e)) => Err(HandshakeError::Malformed(e)),
        None => Err(HandshakeError::Closed),
    }
}

fn expect_kind(frame: &AuthMessage, expected: AuthKind) -> Result<(), HandshakeError> {
    if frame.kind == expected {
        Ok(())
    } else {
        Err(HandshakeError::UnexpectedFrame {
            expected,
            got: frame.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    const PSK: &str = "5f4dcc3b5aa765d61d8327deb882cf995f4dcc3b5aa765d61d8327deb882cf99";
    const DEADLINE: Duration = Duration::from_secs(2);

    fn endpoint(stream: DuplexStream) -> (FrameReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
        let (read, write) = split(stream);
        (FrameReader::new(read, 4096), write)
    }

    fn auth(node_id: &str) -> Authenticator {
        Authenticator::from_hex(node_id, PSK).unwrap()
    }

    #[tokio::test]
    async fn both_sides_authenticate() {
        let (a, b) = duplex(4096);
        let (mut a_reader, mut a_writer) = endpoint(a);
        let (mut b_reader, mut b_writer) = endpoint(b);
        let alpha = auth("alpha");
        let beta = auth("beta");

        let mut acceptor = Handshake::acceptor(&alpha, DEADLINE);
        let mut initiator = Handshake::initiator(&beta, DEADLINE);
        assert_eq!(acceptor.state(), HandshakeState::Init);

        let (accepted, initiated) = tokio::join!(
            acceptor.run(&mut a_reader, &mut a_writer),
            initiator.run(&mut b_reader, &mut b_writer),
        );

        assert_eq!(accepted.unwrap(), "beta");
        assert_eq!(initiated.unwrap(), "alpha");
        assert_eq!(acceptor.state(), HandshakeState::Authenticated);
        assert_eq!(initiator.state(), HandshakeState::Authenticated);
    }

    #[tokio::test]
    async fn mismatched_secrets_fail_on_both_sides() {
        let (a, b) = duplex(4096);
        let (mut a_reader, mut a_writer) = endpoint(a);
        let (mut b_reader, mut b_writer) = endpoint(b);
        let alpha = auth("alpha");
        let beta = Authenticator::new("beta");

        let mut acceptor = Handshake::acceptor(&alpha, DEADLINE);
        let mut initiator = Handshake::initiator(&beta, Duration::from_millis(300));

        let (accepted, initiated) = tokio::join!(
            async {
                let result = acceptor.run(&mut a_reader, &mut a_writer).await;
                // Closing the acceptor's end lets the initiator see EOF.
                drop(a_reader);
                drop(a_writer);
                result
            },
            initiator.run(&mut b_reader, &mut b_writer),
        );

        assert!(matches!(accepted, Err(HandshakeError::ResponseMismatch { ref peer_id }) if peer_id == "beta"));
        assert!(initiated.is_err());
        assert_eq!(acceptor.state(), HandshakeState::Failed);
        assert_eq!(initiator.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (a, _b) = duplex(4096);
        let (mut reader, mut writer) = endpoint(a);
        let alpha = auth("alpha");

        let mut acceptor = Handshake::acceptor(&alpha, Duration::from_millis(100));
        let result = acceptor.run(&mut reader, &mut writer).await;

        assert!(matches!(result, Err(HandshakeError::Timeout(_))));
        assert_eq!(acceptor.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (a, b) = duplex(4096);
        let (mut reader, mut writer) = endpoint(a);
        let (_, mut peer_writer) = split(b);
        peer_writer.write_all(b"hello there\n").await.unwrap();

        let beta = auth("beta");
        let mut initiator = Handshake::initiator(&beta, DEADLINE);
        let result = initiator.run(&mut reader, &mut writer).await;
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }

    #[tokio::test]
    async fn response_first_is_unexpected() {
        let (a, b) = duplex(4096);
        let (mut reader, mut writer) = endpoint(a);
        let (_, mut peer_writer) = split(b);
        write_frame(&mut peer_writer, &AuthMessage::response("alpha", "00", None)).await.unwrap();

        let beta = auth("beta");
        let mut initiator = Handshake::initiator(&beta, DEADLINE);
        let result = initiator.run(&mut reader, &mut writer).await;
        assert!(matches!(
            result,
            Err(HandshakeError::UnexpectedFrame { expected: AuthKind::Challenge, got: AuthKind::Response })
        ));
    }

    #[tokio::test]
    async fn peer_claiming_our_id_is_rejected() {
        let (a, b) = duplex(4096);
        let (mut reader, mut writer) = endpoint(a);
        let (_, mut peer_writer) = split(b);
        write_frame(&mut peer_writer, &AuthMessage::challenge("beta", "abcd")).await.unwrap();

        let beta = auth("beta");
        let mut initiator = Handshake::initiator(&beta, DEADLINE);
        let result = initiator.run(&mut reader, &mut writer).await;
        assert!(matches!(result, Err(HandshakeError::SelfConnection)));
    }

    #[tokio::test]
    async fn eof_before_challenge_is_closed() {
        let (a, b) = duplex(4096);
        let (mut reader, mut writer) = endpoint(a);
        drop(b);

        let beta = auth("beta");
        let mut initiator = Handshake::initiator(&beta, DEADLINE);
        let result = initiator.run(&mut reader, &mut writer).await;
        assert!(matches!(result, Err(HandshakeError::Closed)));
    }
}
