//! BitTorrent Module
//!
//! This module handles the connection-establishment side of the peer wire
//! protocol:
//! - Message Stream Encryption handshake (MSE/PE)
//! - Lookup of known torrents for incoming obfuscated connections
//! - Detection of plain BitTorrent handshakes

pub mod mse;
pub mod registry;

// Re-export commonly used types
pub use mse::{
    accept_with_mse, connect_with_mse, negotiate, CryptoMethod, Direction, EncryptedStream,
    Negotiated, TcpConnector,
};
pub use registry::{SharedRegistry, TorrentRegistry};

/// SHA-1 info hash identifying a torrent (SKEY in MSE terms)
pub type Sha1Hash = [u8; 20];

/// Protocol string for BitTorrent handshake
pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// Length prefix + protocol string: the first bytes of a plain handshake
pub const PLAINTEXT_HEADER: &[u8; 20] = b"\x13BitTorrent protocol";

/// Bytes peeked from an incoming connection to tell plaintext from MSE
pub const PLAINTEXT_HEADER_LEN: usize = 20;

/// Check whether `head` starts a plain BitTorrent handshake
pub fn is_plaintext_header(head: &[u8]) -> bool {
    head.len() >= PLAINTEXT_HEADER_LEN
        && head[0] as usize == PROTOCOL_STRING.len()
        && &head[1..PLAINTEXT_HEADER_LEN] == PROTOCOL_STRING
}

/// Build the 68-byte plain BitTorrent handshake
pub fn plaintext_handshake(info_hash: &Sha1Hash, peer_id: &[u8; 20]) -> Vec<u8> {
    let mut handshake = Vec::with_capacity(68);
    handshake.push(PROTOCOL_STRING.len() as u8);
    handshake.extend_from_slice(PROTOCOL_STRING);
    handshake.extend_from_slice(&[0u8; 8]);
    handshake.extend_from_slice(info_hash);
    handshake.extend_from_slice(peer_id);
    handshake
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_header_detection() {
        let handshake = plaintext_handshake(&[1u8; 20], &[2u8; 20]);
        assert_eq!(handshake.len(), 68);
        assert!(is_plaintext_header(&handshake));
        assert_eq!(&handshake[..20], PLAINTEXT_HEADER);

        assert!(!is_plaintext_header(&handshake[..10]));
        assert!(!is_plaintext_header(&[0x13u8; 20]));

        let mut wrong_case = handshake.clone();
        wrong_case[1] = b'b';
        assert!(!is_plaintext_header(&wrong_case));
    }
}
