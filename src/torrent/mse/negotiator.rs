//! Policy-driven connection negotiation
//!
//! Decides per connection whether to run the initiator, the responder, or no
//! handshake at all, applies the overall deadline and hands back the keyed
//! connection. Retrying a failed outgoing handshake in plaintext is done by
//! reconnecting through a [`Connector`], never inside the state machines.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::cipher::StreamCipher;
use super::initiator::InitiatorHandshake;
use super::responder::ResponderHandshake;
use super::stream::EncryptedStream;
use super::transport::HandshakeTransport;
use super::{CryptoMethod, HandshakeOutcome};
use crate::config::{EncryptionPolicy, MseConfig};
use crate::error::{MseError, Result};
use crate::torrent::registry::TorrentRegistry;
use crate::torrent::{is_plaintext_header, Sha1Hash, PLAINTEXT_HEADER_LEN};

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted from a listener, the torrent is learned from the peer
    Incoming,
    /// Dialed by us for a known torrent
    Outgoing(Sha1Hash),
}

/// A negotiated connection, owned by the caller from here on
pub struct Negotiated<S> {
    /// Raw connection, bytes on it are ciphertext unless `method` says otherwise
    pub stream: S,
    /// Cipher for outgoing data
    pub encryptor: StreamCipher,
    /// Cipher for incoming data
    pub decryptor: StreamCipher,
    /// Plaintext application bytes already received
    pub leftover: Vec<u8>,
    /// Negotiated method, None when no MSE handshake took place
    pub method: Option<CryptoMethod>,
    /// Torrent of the connection, None for incoming plaintext connections
    pub info_hash: Option<Sha1Hash>,
}

impl<S> Negotiated<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn plaintext(stream: S, leftover: Vec<u8>, info_hash: Option<Sha1Hash>) -> Self {
        Self {
            stream,
            encryptor: StreamCipher::HeaderOnly,
            decryptor: StreamCipher::HeaderOnly,
            leftover,
            method: None,
            info_hash,
        }
    }

    fn from_handshake(outcome: HandshakeOutcome, transport: HandshakeTransport<S>) -> Self {
        let HandshakeOutcome {
            encryptor,
            mut decryptor,
            mut leftover,
            method,
            info_hash,
        } = outcome;

        // Replay bytes the handshake did not need are session data. Only a
        // caller that pre-read past the peer's handshake messages leaves any.
        let (stream, unread) = transport.into_inner();
        if !unread.is_empty() {
            let mut unread = unread.to_vec();
            decryptor.decrypt(&mut unread);
            leftover.extend_from_slice(&unread);
        }

        Self {
            stream,
            encryptor,
            decryptor,
            leftover,
            method: Some(method),
            info_hash: Some(info_hash),
        }
    }

    /// Whether an MSE handshake took place
    pub fn is_mse(&self) -> bool {
        self.method.is_some()
    }

    /// Wrap into a stream that applies the ciphers transparently
    pub fn into_stream(self) -> EncryptedStream<S> {
        EncryptedStream::new(
            self.stream,
            self.encryptor,
            self.decryptor,
            self.leftover,
            self.method,
        )
    }
}

/// Run `fut` under the negotiation deadline
///
/// On expiry the future, and with it the connection, is dropped.
async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!("MSE negotiation timed out after {:?}", deadline);
            Err(MseError::TimedOut(deadline))
        }
    }
}

async fn dispose<S: AsyncWrite + Unpin>(mut stream: S) {
    if let Err(e) = stream.shutdown().await {
        tracing::trace!("Shutdown after failed negotiation: {}", e);
    }
}

/// Negotiate an outgoing connection for `info_hash`
///
/// `initial_payload` is delivered to the peer as part of the exchange:
/// encrypted inside the MSE handshake, or written in the clear when the
/// policy does not initiate MSE.
pub async fn negotiate_outgoing<S>(
    stream: S,
    info_hash: Sha1Hash,
    config: &MseConfig,
    initial_payload: Vec<u8>,
) -> Result<Negotiated<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    config.validate()?;

    if !config.policy.initiates_mse() {
        tracing::debug!("MSE policy {} - connecting in plaintext", config.policy);
        let mut stream = stream;
        if !initial_payload.is_empty() {
            if let Err(e) = with_deadline(config.timeout(), async {
                stream.write_all(&initial_payload).await?;
                stream.flush().await?;
                Ok::<(), MseError>(())
            })
            .await
            {
                dispose(stream).await;
                return Err(e);
            }
        }
        return Ok(Negotiated::plaintext(stream, Vec::new(), Some(info_hash)));
    }

    let handshake = InitiatorHandshake::new(info_hash, config).with_initial_payload(initial_payload);
    let (outcome, transport) =
        with_deadline(config.timeout(), handshake.run(HandshakeTransport::new(stream))).await?;
    Ok(Negotiated::from_handshake(outcome, transport))
}

/// Negotiate an accepted connection
///
/// The first 20 bytes are peeked. A plain BitTorrent header is accepted if
/// the policy allows it and returned as leftover. Anything else is treated
/// as an MSE handshake, with the peeked bytes replayed into it.
pub async fn negotiate_incoming<S>(
    stream: S,
    registry: &dyn TorrentRegistry,
    config: &MseConfig,
) -> Result<Negotiated<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    config.validate()?;

    with_deadline(config.timeout(), async move {
        let mut stream = stream;
        let mut head = [0u8; PLAINTEXT_HEADER_LEN];
        if let Err(e) = stream.read_exact(&mut head).await {
            dispose(stream).await;
            return Err(MseError::from(e));
        }

        if is_plaintext_header(&head) {
            if config.policy.accepts_plaintext() {
                tracing::debug!("Incoming plaintext BitTorrent connection");
                return Ok(Negotiated::plaintext(stream, head.to_vec(), None));
            }
            tracing::warn!("Rejecting plaintext peer, encryption is required");
            dispose(stream).await;
            return Err(MseError::policy("Encryption required but peer sent plaintext"));
        }

        if !config.policy.accepts_mse() {
            tracing::warn!("Rejecting encrypted peer, encryption is disabled");
            dispose(stream).await;
            return Err(MseError::policy(
                "Peer did not send a BitTorrent handshake and encryption is disabled",
            ));
        }

        let transport = HandshakeTransport::with_preread(stream, BytesMut::from(&head[..]));
        let (outcome, transport) = ResponderHandshake::new(registry, config)
            .run(transport)
            .await?;
        Ok(Negotiated::from_handshake(outcome, transport))
    })
    .await
}

/// Negotiate a connection in either direction
pub async fn negotiate<S>(
    stream: S,
    direction: Direction,
    registry: &dyn TorrentRegistry,
    config: &MseConfig,
) -> Result<Negotiated<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match direction {
        Direction::Outgoing(info_hash) => {
            negotiate_outgoing(stream, info_hash, config, Vec::new()).await
        }
        Direction::Incoming => negotiate_incoming(stream, registry, config).await,
    }
}

// ============================================================================
// Connecting
// ============================================================================

/// Opens raw connections to one peer
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a new connection
    async fn connect(&self) -> io::Result<Self::Stream>;
}

/// TCP connector with a dial timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Peer address
    pub addr: SocketAddr,
    /// Dial timeout for each connection attempt
    pub connect_timeout: Duration,
}

impl TcpConnector {
    /// Connector for `addr` with a 10 second dial timeout
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Peer connection timeout"))?
    }
}

/// Connect to peer with MSE negotiation based on policy
///
/// With the Preferred policy a failed MSE attempt that looks like a peer
/// without MSE support is retried once over a fresh plaintext connection.
pub async fn connect_with_mse<C: Connector>(
    connector: &C,
    info_hash: Sha1Hash,
    config: &MseConfig,
    initial_payload: Vec<u8>,
) -> Result<EncryptedStream<C::Stream>> {
    let stream = connector.connect().await?;

    let err = match negotiate_outgoing(stream, info_hash, config, initial_payload.clone()).await {
        Ok(negotiated) => return Ok(negotiated.into_stream()),
        Err(e) => e,
    };

    let fallback = config.policy == EncryptionPolicy::Preferred
        && config.allow_plaintext_fallback
        && err.is_fallback_candidate();
    if !fallback {
        return Err(err);
    }

    tracing::warn!("MSE handshake failed ({}), reconnecting in plaintext", err);
    let plain_config = config.clone().policy(EncryptionPolicy::Disabled);
    let stream = connector.connect().await?;
    let negotiated = negotiate_outgoing(stream, info_hash, &plain_config, initial_payload).await?;
    Ok(negotiated.into_stream())
}

/// Accept an incoming connection with MSE negotiation based on policy
pub async fn accept_with_mse<S>(
    stream: S,
    registry: &dyn TorrentRegistry,
    config: &MseConfig,
) -> Result<EncryptedStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    negotiate_incoming(stream, registry, config)
        .await
        .map(Negotiated::into_stream)
}
