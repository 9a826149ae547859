//! Known-torrent lookup for incoming obfuscated connections
//!
//! The responder only sees `HASH('req2', SKEY) xor HASH('req3', S)`. It strips
//! the mask with its own `HASH('req3', S)` and compares the result with
//! `HASH('req2', candidate)` for every torrent the engine knows.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use super::mse::common::{req2_hash, xor20};
use super::Sha1Hash;

/// Source of the info hashes an incoming connection may ask for
pub trait TorrentRegistry: Send + Sync {
    /// Snapshot of the known info hashes
    fn info_hashes(&self) -> Vec<Sha1Hash>;

    /// Find the torrent whose masked hash matches, first match wins
    fn find_masked(&self, masked: &[u8; 20], req3: &[u8; 20]) -> Option<Sha1Hash> {
        let target = xor20(masked, req3);
        self.info_hashes()
            .into_iter()
            .find(|candidate| req2_hash(candidate) == target)
    }
}

impl TorrentRegistry for [Sha1Hash] {
    fn info_hashes(&self) -> Vec<Sha1Hash> {
        self.to_vec()
    }
}

impl TorrentRegistry for Vec<Sha1Hash> {
    fn info_hashes(&self) -> Vec<Sha1Hash> {
        self.clone()
    }
}

impl TorrentRegistry for HashSet<Sha1Hash> {
    fn info_hashes(&self) -> Vec<Sha1Hash> {
        self.iter().copied().collect()
    }
}

/// Registry shared between the engine and concurrent handshakes
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<HashSet<Sha1Hash>>>,
}

impl SharedRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a torrent, returns false if it was already known
    pub fn insert(&self, info_hash: Sha1Hash) -> bool {
        self.inner.write().insert(info_hash)
    }

    /// Forget a torrent
    pub fn remove(&self, info_hash: &Sha1Hash) -> bool {
        self.inner.write().remove(info_hash)
    }

    /// Whether the torrent is known
    pub fn contains(&self, info_hash: &Sha1Hash) -> bool {
        self.inner.read().contains(info_hash)
    }

    /// Number of known torrents
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no torrent is known
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl FromIterator<Sha1Hash> for SharedRegistry {
    fn from_iter<I: IntoIterator<Item = Sha1Hash>>(iter: I) -> Self {
        Self {
            inner: Arc::new(RwLock::new(iter.into_iter().collect())),
        }
    }
}

impl TorrentRegistry for SharedRegistry {
    fn info_hashes(&self) -> Vec<Sha1Hash> {
        self.inner.read().iter().copied().collect()
    }
}
