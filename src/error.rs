//! Typed error hierarchy for gosh-mse
//!
//! Every handshake failure is terminal for the current attempt. The error
//! carries enough context for the caller to decide whether to try the peer
//! again, fall back to plaintext, or give up on it.

use std::time::Duration;
use thiserror::Error;

/// Main error type for MSE negotiation
#[derive(Debug, Error)]
pub enum MseError {
    /// I/O failure, EOF or short read on the underlying connection
    #[error("Transport error: {message}")]
    Transport {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Marker not found in the stream within the byte budget
    #[error("Failed to synchronize on {marker} within {budget} bytes")]
    SynchronizationFailed { marker: &'static str, budget: usize },

    /// Decrypted verification constant did not match
    #[error("Verification constant mismatch")]
    VerificationFailed,

    /// No locally known torrent matches the peer's obfuscated info hash
    #[error("Peer requested an unknown torrent")]
    UnknownTorrent,

    /// The two peers share no crypto method
    #[error("No compatible cipher (provided: {provided:#x}, allowed: {allowed:#x})")]
    NoCompatibleCipher { provided: u32, allowed: u32 },

    /// Deadline for the whole negotiation expired
    #[error("Handshake timed out after {0:?}")]
    TimedOut(Duration),

    /// Peer sent a structurally invalid handshake field
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Connection shape is not allowed by the local encryption policy
    #[error("Rejected by encryption policy: {0}")]
    PolicyRejected(String),

    /// Invalid input from the caller
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
}

/// Transport error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection refused while dialing
    ConnectionRefused,
    /// Connection reset or broken pipe
    ConnectionReset,
    /// Peer closed the stream before the expected bytes arrived
    Eof,
    /// Dial or I/O timeout
    Timeout,
    /// Other I/O error
    Other,
}

impl MseError {
    /// Check if another attempt against the same peer can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => matches!(
                kind,
                NetworkErrorKind::Timeout | NetworkErrorKind::ConnectionReset
            ),
            Self::TimedOut(_) => true,
            _ => false,
        }
    }

    /// Check if the peer probably does not speak MSE at all, so a plaintext
    /// reconnect is worth trying
    pub fn is_fallback_candidate(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::SynchronizationFailed { .. }
                | Self::TimedOut(_)
                | Self::NoCompatibleCipher { .. }
        )
    }

    /// Create a transport error
    pub fn transport(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Create a policy rejection error
    pub fn policy(message: impl Into<String>) -> Self {
        Self::PolicyRejected(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias for MSE operations
pub type Result<T> = std::result::Result<T, MseError>;

impl From<std::io::Error> for MseError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::UnexpectedEof => NetworkErrorKind::Eof,
            ErrorKind::ConnectionRefused => NetworkErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => NetworkErrorKind::ConnectionReset,
            ErrorKind::TimedOut => NetworkErrorKind::Timeout,
            _ => NetworkErrorKind::Other,
        };
        Self::Transport {
            kind,
            message: err.to_string(),
        }
    }
}
