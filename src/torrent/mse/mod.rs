//! Message Stream Encryption (MSE/PE) Implementation
//!
//! This module implements BitTorrent protocol encryption as defined in the
//! de facto MSE specification. It provides:
//! - Diffie-Hellman key exchange with 768-bit prime
//! - RC4 stream cipher for message encryption (with 1024 byte discard)
//! - Initiator and responder handshakes, including responder-side torrent
//!   discovery from the obfuscated info hash
//! - Policy-driven negotiation with plaintext fallback
//! - Transparent encrypted stream wrapper
//!
//! Wire layout:
//!
//! ```text
//! 1 A->B: Ya(96) PadA(0..512)
//! 2 B->A: Yb(96) PadB(0..512)
//! 3 A->B: HASH('req1', S) HASH('req2', SKEY) xor HASH('req3', S)
//!         ENC(VC, crypto_provide, len(PadC), PadC, len(IA), IA)
//! 4 B->A: ENC(VC, crypto_select, len(PadD), PadD)
//! ```

pub mod cipher;
pub mod common;
pub mod dh;
pub mod initiator;
pub mod negotiator;
pub mod responder;
pub mod stream;
pub mod sync;
pub mod transport;

pub use cipher::{Rc4Cipher, StreamCipher};
pub use common::{CryptoMethod, Role};
pub use dh::{DhKeyPair, SharedSecret};
pub use initiator::InitiatorHandshake;
pub use negotiator::{
    accept_with_mse, connect_with_mse, negotiate, negotiate_incoming, negotiate_outgoing,
    Connector, Direction, Negotiated, TcpConnector,
};
pub use responder::ResponderHandshake;
pub use stream::EncryptedStream;
pub use transport::HandshakeTransport;

use crate::torrent::Sha1Hash;

// ============================================================================
// Constants
// ============================================================================

/// Length of a DH public value or shared secret
pub const DH_KEY_LEN: usize = 96;

/// Length of a DH private exponent (160 bits)
pub const DH_PRIVATE_LEN: usize = 20;

/// Verification constant: 8 zero bytes
pub const VC: [u8; 8] = [0u8; 8];

/// Maximum padding length
pub const MAX_PADDING: usize = 512;

/// RC4 discard count (first 1024 bytes discarded)
pub const RC4_DISCARD: usize = 1024;

/// Encryption method: plaintext (header-only obfuscation)
pub const CRYPTO_PLAINTEXT: u32 = 0x01;

/// Encryption method: RC4
pub const CRYPTO_RC4: u32 = 0x02;

/// Sync point for the initiator: Yb + PadB + ENC(VC)
pub const INITIATOR_SYNC_BUDGET: usize = DH_KEY_LEN + MAX_PADDING + VC.len();

/// Sync point for the responder: Ya + PadA + HASH('req1', S)
pub const RESPONDER_SYNC_BUDGET: usize = DH_KEY_LEN + MAX_PADDING + 20;

// ============================================================================
// Handshake Result
// ============================================================================

/// What a completed handshake hands back to its caller
///
/// All other handshake state (key pair, S, framing ciphers) is gone by the
/// time this exists.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Cipher for outgoing data
    pub encryptor: StreamCipher,
    /// Cipher for incoming data
    pub decryptor: StreamCipher,
    /// Plaintext application bytes that arrived with the handshake
    pub leftover: Vec<u8>,
    /// Negotiated crypto method
    pub method: CryptoMethod,
    /// Torrent the connection belongs to
    pub info_hash: Sha1Hash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_constants() {
        assert_eq!(CRYPTO_PLAINTEXT, 0x01);
        assert_eq!(CRYPTO_RC4, 0x02);
        assert_eq!(CRYPTO_PLAINTEXT & CRYPTO_RC4, 0);
    }

    #[test]
    fn test_sync_budgets() {
        assert_eq!(INITIATOR_SYNC_BUDGET, 616);
        assert_eq!(RESPONDER_SYNC_BUDGET, 628);
    }

    #[test]
    fn test_vc_constant() {
        assert_eq!(VC.len(), 8);
        assert!(VC.iter().all(|&b| b == 0));
    }
}
