//! RC4 stream cipher and the header-only pass-through cipher

use super::RC4_DISCARD;
use crate::error::{MseError, Result};

/// RC4 cipher state
#[derive(Clone)]
pub struct Rc4Cipher {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4Cipher {
    /// Create a new RC4 cipher with the given key
    ///
    /// The first 1024 keystream bytes are discarded (RC4-drop1024). An empty
    /// key is rejected.
    pub fn new(key: &[u8]) -> Result<Self> {
        let mut cipher = Self::new_no_discard(key)?;
        cipher.discard();
        Ok(cipher)
    }

    /// Cipher keyed with a SHA-1 digest, as the handshake derives them
    pub(crate) fn from_digest(key: &[u8; 20]) -> Self {
        let mut cipher = Self::schedule(key);
        cipher.discard();
        cipher
    }

    /// Create RC4 cipher without discard
    pub(crate) fn new_no_discard(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(MseError::invalid_input("rc4_key", "Key must not be empty"));
        }
        Ok(Self::schedule(key))
    }

    /// Key scheduling, `key` is non-empty
    fn schedule(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, byte) in state.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    fn discard(&mut self) {
        let mut discard = [0u8; RC4_DISCARD];
        self.process(&mut discard);
    }

    /// Process data in-place (encrypt or decrypt - symmetric)
    pub fn process(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let k = self.state
                [(self.state[self.i as usize].wrapping_add(self.state[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}

impl std::fmt::Debug for Rc4Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Rc4Cipher(..)")
    }
}

/// Cipher applied to one direction of a connection
///
/// `HeaderOnly` leaves the bytes untouched. It is what both directions get
/// after a handshake that selected the plaintext crypto method.
#[derive(Debug, Clone)]
pub enum StreamCipher {
    /// Full-stream RC4
    Rc4(Box<Rc4Cipher>),
    /// No-op, only the handshake was obfuscated
    HeaderOnly,
}

impl StreamCipher {
    /// RC4 keyed with `key`, keystream already advanced past the discard
    pub fn rc4(key: &[u8]) -> Result<Self> {
        Ok(Self::Rc4(Box::new(Rc4Cipher::new(key)?)))
    }

    /// RC4 keyed with a handshake-derived digest
    pub(crate) fn rc4_digest(key: &[u8; 20]) -> Self {
        Self::Rc4(Box::new(Rc4Cipher::from_digest(key)))
    }

    /// Encrypt `data` in place
    pub fn encrypt(&mut self, data: &mut [u8]) {
        if let Self::Rc4(rc4) = self {
            rc4.process(data);
        }
    }

    /// Decrypt `data` in place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        if let Self::Rc4(rc4) = self {
            rc4.process(data);
        }
    }

    /// Encrypt into a new buffer
    pub fn encrypt_to_vec(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.encrypt(&mut out);
        out
    }

    /// Whether bytes are transformed at all
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Rc4(_))
    }
}
