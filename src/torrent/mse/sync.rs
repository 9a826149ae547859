//! Byte stream synchronization
//!
//! Both roles have to skip an unknown amount of random padding sent by the
//! peer before a marker they can compute locally. The marker is located with
//! a sliding window over the stream that never reads past the marker itself,
//! so whatever follows it stays in the transport for the next read.

use tokio::io::{AsyncRead, AsyncWrite};

use super::transport::HandshakeTransport;
use crate::error::{MseError, Result};

/// Consume bytes until `marker` has just been read
///
/// `budget` bounds the total number of bytes received since the connection
/// started, not since this call. A refill that would cross it fails with
/// `SynchronizationFailed` without reading.
///
/// `label` names the marker in errors and logs.
pub async fn synchronize<S>(
    transport: &mut HandshakeTransport<S>,
    marker: &[u8],
    budget: usize,
    label: &'static str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let len = marker.len();
    if len == 0 {
        return Ok(());
    }

    let start = transport.bytes_received();
    let mut window = vec![0u8; len];
    // Bytes at the end of the window that still have to be read
    let mut missing = len;

    loop {
        if transport.bytes_received() + missing > budget {
            return Err(MseError::SynchronizationFailed {
                marker: label,
                budget,
            });
        }
        transport.receive_exact(&mut window[len - missing..]).await?;

        if window == marker {
            tracing::trace!(
                "MSE synchronized on {} after {} bytes of padding",
                label,
                transport.bytes_received() - start - len
            );
            return Ok(());
        }

        // Index 0 is excluded so each round advances at least one byte
        missing = match window[1..].iter().position(|&b| b == marker[0]) {
            Some(pos) => {
                let k = pos + 1;
                window.copy_within(k.., 0);
                k
            }
            None => len,
        };
    }
}
