//! # gosh-mse
//!
//! BitTorrent Message Stream Encryption (MSE/PE) for async byte streams.
//!
//! ## Features
//!
//! - **Both roles**: initiator for outgoing connections, responder for
//!   incoming ones with torrent discovery from the obfuscated info hash
//! - **Cipher negotiation**: full-stream RC4 or header-only obfuscation
//! - **Policy**: disabled, allowed, preferred (with plaintext fallback) or
//!   required encryption
//! - **Transport agnostic**: any `tokio` `AsyncRead + AsyncWrite` stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gosh_mse::{connect_with_mse, MseConfig, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MseConfig::default();
//!     let connector = TcpConnector::new("127.0.0.1:6881".parse()?);
//!     let info_hash = [0u8; 20];
//!
//!     let mut stream = connect_with_mse(&connector, info_hash, &config, Vec::new()).await?;
//!     stream.write_all(b"\x13BitTorrent protocol").await?;
//!     println!("encrypted: {}", stream.is_encrypted());
//!
//!     Ok(())
//! }
//! ```

// Modules
pub mod config;
pub mod error;
pub mod torrent;

// Re-exports for convenience
pub use config::{EncryptionPolicy, MseConfig};
pub use error::{MseError, NetworkErrorKind, Result};
pub use torrent::mse::{
    accept_with_mse, connect_with_mse, negotiate, negotiate_incoming, negotiate_outgoing,
    Connector, CryptoMethod, DhKeyPair, Direction, EncryptedStream, HandshakeOutcome,
    HandshakeTransport, InitiatorHandshake, Negotiated, ResponderHandshake, StreamCipher,
    TcpConnector,
};
pub use torrent::{SharedRegistry, Sha1Hash, TorrentRegistry};
