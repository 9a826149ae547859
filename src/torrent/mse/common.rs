//! Shared handshake mechanics
//!
//! Stateless helpers used by both the initiator and the responder: hashing,
//! directional key derivation, crypto method negotiation, padding and length
//! prefixes. Control flow lives in the two role modules.

use rand::Rng;
use sha1::{Digest, Sha1};

use super::cipher::StreamCipher;
use super::dh::SharedSecret;
use super::{CRYPTO_PLAINTEXT, CRYPTO_RC4, MAX_PADDING};
use crate::error::{MseError, Result};
use crate::torrent::Sha1Hash;

/// Which side of the handshake we are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting peer (PeerA)
    Initiator,
    /// Accepting peer (PeerB)
    Responder,
}

/// Crypto method negotiated through crypto_provide/crypto_select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMethod {
    /// Only the handshake is obfuscated, payload is sent in the clear
    Plaintext,
    /// Full-stream RC4
    Rc4,
}

impl CryptoMethod {
    /// Bit of this method in crypto_provide/crypto_select
    pub fn bit(&self) -> u32 {
        match self {
            Self::Plaintext => CRYPTO_PLAINTEXT,
            Self::Rc4 => CRYPTO_RC4,
        }
    }
}

impl std::fmt::Display for CryptoMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext => write!(f, "plaintext"),
            Self::Rc4 => write!(f, "rc4"),
        }
    }
}

/// SHA-1 over the concatenation of `parts`
pub fn hash(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// HASH('req1', S), the responder's synchronization marker
pub fn req1_hash(secret: &SharedSecret) -> [u8; 20] {
    hash(&[b"req1", secret.as_bytes()])
}

/// HASH('req2', SKEY)
pub fn req2_hash(skey: &Sha1Hash) -> [u8; 20] {
    hash(&[b"req2", skey])
}

/// HASH('req3', S)
pub fn req3_hash(secret: &SharedSecret) -> [u8; 20] {
    hash(&[b"req3", secret.as_bytes()])
}

/// XOR two 20-byte hashes
pub fn xor20(a: &[u8; 20], b: &[u8; 20]) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// HASH('req2', SKEY) xor HASH('req3', S)
pub fn masked_skey(skey: &Sha1Hash, secret: &SharedSecret) -> [u8; 20] {
    xor20(&req2_hash(skey), &req3_hash(secret))
}

/// SHA1(salt || S || SKEY)
pub fn derive_cipher_key(salt: &[u8], secret: &SharedSecret, skey: &Sha1Hash) -> [u8; 20] {
    hash(&[salt, secret.as_bytes(), skey])
}

/// RC4 pair used for handshake framing
///
/// Consumed by [`HandshakeCiphers::commit`] once the crypto method is known.
#[derive(Debug)]
pub struct HandshakeCiphers {
    /// Encrypts what this side sends
    pub encryptor: StreamCipher,
    /// Decrypts what the peer sends
    pub decryptor: StreamCipher,
}

impl HandshakeCiphers {
    /// Turn the handshake pair into the session pair for `method`
    ///
    /// RC4 continues the running keystreams. Plaintext drops them.
    pub fn commit(self, method: CryptoMethod) -> (StreamCipher, StreamCipher) {
        match method {
            CryptoMethod::Rc4 => (self.encryptor, self.decryptor),
            CryptoMethod::Plaintext => (StreamCipher::HeaderOnly, StreamCipher::HeaderOnly),
        }
    }
}

/// Derive both directional ciphers
///
/// The initiator encrypts with keyA and decrypts with keyB. The responder
/// does the reverse.
pub fn derive_ciphers(secret: &SharedSecret, skey: &Sha1Hash, role: Role) -> HandshakeCiphers {
    let key_a = derive_cipher_key(b"keyA", secret, skey);
    let key_b = derive_cipher_key(b"keyB", secret, skey);

    let (enc_key, dec_key) = match role {
        Role::Initiator => (key_a, key_b),
        Role::Responder => (key_b, key_a),
    };

    HandshakeCiphers {
        encryptor: StreamCipher::rc4_digest(&enc_key),
        decryptor: StreamCipher::rc4_digest(&dec_key),
    }
}

/// Pick the preferred method present in both bitfields (RC4 over plaintext)
pub fn select_cipher(remote_provide: u32, local_allowed: u32) -> Result<CryptoMethod> {
    let common = remote_provide & local_allowed;
    if common & CRYPTO_RC4 != 0 {
        Ok(CryptoMethod::Rc4)
    } else if common & CRYPTO_PLAINTEXT != 0 {
        Ok(CryptoMethod::Plaintext)
    } else {
        Err(MseError::NoCompatibleCipher {
            provided: remote_provide,
            allowed: local_allowed,
        })
    }
}

/// Validate a crypto_select received from the responder
///
/// Exactly one bit must be set and it must be one we provided.
pub fn parse_crypto_select(select: u32, provided: u32) -> Result<CryptoMethod> {
    let method = match select {
        CRYPTO_RC4 => CryptoMethod::Rc4,
        CRYPTO_PLAINTEXT => CryptoMethod::Plaintext,
        _ => {
            return Err(MseError::NoCompatibleCipher {
                provided,
                allowed: select,
            })
        }
    };

    if provided & select == 0 {
        return Err(MseError::NoCompatibleCipher {
            provided,
            allowed: select,
        });
    }
    Ok(method)
}

/// Random padding of `min..=max` bytes, capped at 512
pub fn random_padding(min: usize, max: usize) -> Vec<u8> {
    let max = max.min(MAX_PADDING);
    let min = min.min(max);
    let mut rng = rand::rng();
    let len = rng.random_range(min..=max);
    let mut padding = vec![0u8; len];
    rng.fill(&mut padding[..]);
    padding
}

/// 2-byte big-endian length prefix
pub fn encode_len(len: usize, field: &'static str) -> Result<[u8; 2]> {
    u16::try_from(len)
        .map(u16::to_be_bytes)
        .map_err(|_| MseError::invalid_input(field, format!("{} bytes exceeds 65535", len)))
}

/// Inverse of [`encode_len`]
pub fn decode_len(bytes: [u8; 2]) -> usize {
    u16::from_be_bytes(bytes) as usize
}

/// Reject padding lengths above the protocol maximum
pub fn check_padding_len(len: usize, field: &str) -> Result<()> {
    if len > MAX_PADDING {
        return Err(MseError::protocol(format!(
            "{} length {} exceeds {}",
            field, len, MAX_PADDING
        )));
    }
    Ok(())
}
