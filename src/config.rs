//! MSE configuration
//!
//! This module contains the policy knobs for protocol encryption: which
//! connection shapes are accepted, which crypto methods are offered, how much
//! padding is sent and how long a negotiation may take.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MseError, Result};
use crate::torrent::mse::{CRYPTO_PLAINTEXT, CRYPTO_RC4, MAX_PADDING};

/// Encryption policy for peer connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionPolicy {
    /// Disable encryption entirely (plaintext only)
    Disabled,
    /// Accept encrypted connections but don't initiate them
    Allowed,
    /// Prefer encryption, fall back to plaintext if peer doesn't support
    #[default]
    Preferred,
    /// Require encryption (reject non-MSE peers)
    Required,
}

impl EncryptionPolicy {
    /// Whether outgoing connections should start with an MSE handshake
    pub fn initiates_mse(&self) -> bool {
        matches!(self, Self::Preferred | Self::Required)
    }

    /// Whether a plain BitTorrent handshake is acceptable
    pub fn accepts_plaintext(&self) -> bool {
        !matches!(self, Self::Required)
    }

    /// Whether an incoming MSE handshake is acceptable
    pub fn accepts_mse(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl std::fmt::Display for EncryptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Allowed => write!(f, "allowed"),
            Self::Preferred => write!(f, "preferred"),
            Self::Required => write!(f, "required"),
        }
    }
}

impl std::str::FromStr for EncryptionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "allowed" => Ok(Self::Allowed),
            "preferred" | "prefer" => Ok(Self::Preferred),
            "required" | "forced" => Ok(Self::Required),
            _ => Err(format!("Invalid encryption policy: {}", s)),
        }
    }
}

/// Configuration for MSE/PE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MseConfig {
    /// Encryption policy
    #[serde(default)]
    pub policy: EncryptionPolicy,

    /// Offer/accept header-only obfuscation (crypto method 0x01)
    #[serde(default = "default_true")]
    pub allow_plaintext: bool,

    /// Offer/accept full-stream RC4 (crypto method 0x02)
    #[serde(default = "default_true")]
    pub allow_rc4: bool,

    /// Minimum random padding bytes for obfuscation
    #[serde(default)]
    pub min_padding: usize,

    /// Maximum random padding bytes for obfuscation
    #[serde(default = "default_max_padding")]
    pub max_padding: usize,

    /// Deadline for the whole negotiation in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Reconnect in plaintext when an outgoing MSE attempt fails
    /// (only with the Preferred policy)
    #[serde(default = "default_true")]
    pub allow_plaintext_fallback: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_padding() -> usize {
    MAX_PADDING
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

impl Default for MseConfig {
    fn default() -> Self {
        Self {
            policy: EncryptionPolicy::Preferred,
            allow_plaintext: true,
            allow_rc4: true,
            min_padding: 0,
            max_padding: MAX_PADDING,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            allow_plaintext_fallback: true,
        }
    }
}

impl MseConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the encryption policy
    pub fn policy(mut self, policy: EncryptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set which crypto methods are offered/accepted
    pub fn crypto(mut self, allow_plaintext: bool, allow_rc4: bool) -> Self {
        self.allow_plaintext = allow_plaintext;
        self.allow_rc4 = allow_rc4;
        self
    }

    /// Set the padding range
    pub fn padding(mut self, min: usize, max: usize) -> Self {
        self.min_padding = min;
        self.max_padding = max;
        self
    }

    /// Set the negotiation deadline
    ///
    /// Sub-millisecond remainders are rounded up.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis() + u128::from(timeout.subsec_nanos() % 1_000_000 != 0);
        self.handshake_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable the plaintext reconnect for outgoing connections
    pub fn plaintext_fallback(mut self, enabled: bool) -> Self {
        self.allow_plaintext_fallback = enabled;
        self
    }

    /// Get the crypto_provide bitfield based on configuration
    pub fn crypto_provide(&self) -> u32 {
        let mut provide = 0u32;
        if self.allow_plaintext {
            provide |= CRYPTO_PLAINTEXT;
        }
        if self.allow_rc4 {
            provide |= CRYPTO_RC4;
        }
        provide
    }

    /// Deadline for the whole negotiation
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_padding > MAX_PADDING {
            return Err(MseError::invalid_input(
                "max_padding",
                format!("Must be at most {}", MAX_PADDING),
            ));
        }

        if self.min_padding > self.max_padding {
            return Err(MseError::invalid_input(
                "min_padding",
                "Must not exceed max_padding",
            ));
        }

        if self.policy.accepts_mse() && self.crypto_provide() == 0 {
            return Err(MseError::invalid_input(
                "allow_rc4",
                "At least one crypto method must be allowed",
            ));
        }

        if self.handshake_timeout_ms == 0 {
            return Err(MseError::invalid_input(
                "handshake_timeout_ms",
                "Must be at least 1",
            ));
        }

        Ok(())
    }
}
