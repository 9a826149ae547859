//! Diffie-Hellman key exchange over the fixed 768-bit MSE prime

use num_bigint::BigUint;
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{DH_KEY_LEN, DH_PRIVATE_LEN};

/// The 768-bit prime P used for Diffie-Hellman key exchange (96 bytes)
/// This is the same prime used by most BitTorrent clients
pub const DH_PRIME: [u8; DH_KEY_LEN] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68, 0xC2, 0x34,
    0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74,
    0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37,
    0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6,
    0xF4, 0x4C, 0x42, 0xE9, 0xA6, 0x3A, 0x36, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x05, 0x63,
];

/// Generator G = 2
pub const DH_GENERATOR: u64 = 2;

/// Modular exponentiation `base^exponent mod modulus`
pub fn mod_exp(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exponent, modulus)
}

fn prime() -> BigUint {
    BigUint::from_bytes_be(&DH_PRIME)
}

/// Left-pad a big-endian integer to 96 bytes
fn to_fixed_bytes(value: &BigUint) -> [u8; DH_KEY_LEN] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_KEY_LEN];
    let len = bytes.len().min(DH_KEY_LEN);
    out[DH_KEY_LEN - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    out
}

/// Shared secret S, zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; DH_KEY_LEN]);

impl SharedSecret {
    /// Big-endian bytes of S, always 96 long
    pub fn as_bytes(&self) -> &[u8; DH_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Diffie-Hellman key pair for MSE
pub struct DhKeyPair {
    /// Private key (160-bit random value)
    private: BigUint,
    /// Public key (768-bit value)
    public: [u8; DH_KEY_LEN],
}

impl DhKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut private_bytes = [0u8; DH_PRIVATE_LEN];
        rand::rng().fill(&mut private_bytes);
        let pair = Self::from_private(&private_bytes);
        private_bytes.zeroize();
        pair
    }

    /// Build a key pair from a known private exponent
    pub fn from_private(private_bytes: &[u8; DH_PRIVATE_LEN]) -> Self {
        let private = BigUint::from_bytes_be(private_bytes);
        let public = mod_exp(&BigUint::from(DH_GENERATOR), &private, &prime());
        Self {
            private,
            public: to_fixed_bytes(&public),
        }
    }

    /// Compute shared secret: peer_public^private mod P
    pub fn shared_secret(&self, peer_public: &[u8; DH_KEY_LEN]) -> SharedSecret {
        let peer = BigUint::from_bytes_be(peer_public);
        SharedSecret(to_fixed_bytes(&mod_exp(&peer, &self.private, &prime())))
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> &[u8; DH_KEY_LEN] {
        &self.public
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair").finish_non_exhaustive()
    }
}
