//! Handshake transport
//!
//! Thin adapter over the raw peer connection used while the handshake runs.
//! Bytes the caller already consumed from the socket (for example while
//! probing for a plaintext BitTorrent header) are handed in as a pre-read
//! buffer and replayed before any new socket read.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::{MseError, NetworkErrorKind, Result};

/// Byte transport for one handshake attempt
pub struct HandshakeTransport<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    /// Replay buffer, drained before the socket
    preread: BytesMut,
    /// Bytes delivered to the handshake since the connection started
    received: usize,
}

impl<S> HandshakeTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a fresh connection
    pub fn new(stream: S) -> Self {
        Self::with_preread(stream, BytesMut::new())
    }

    /// Wrap a connection whose first bytes were already read by the caller
    pub fn with_preread(stream: S, preread: BytesMut) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            preread,
            received: 0,
        }
    }

    /// Total bytes received since connection start (replayed bytes included)
    pub fn bytes_received(&self) -> usize {
        self.received
    }

    /// Write the whole buffer
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        send_into(&mut self.writer, data).await
    }

    /// Fill `buf` completely, replay buffer first
    pub async fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        receive_into(&mut self.reader, &mut self.preread, &mut self.received, buf).await
    }

    /// Send `out` and fill `buf` concurrently
    ///
    /// Completion order of the two halves does not matter.
    pub async fn exchange(&mut self, out: &[u8], buf: &mut [u8]) -> Result<()> {
        let Self {
            reader,
            writer,
            preread,
            received,
        } = self;

        tokio::try_join!(
            send_into(writer, out),
            receive_into(reader, preread, received, buf)
        )?;
        Ok(())
    }

    /// Shut the connection down, ignoring errors
    pub async fn dispose(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!("MSE transport shutdown error: {}", e);
        }
    }

    /// Give back the raw stream and any replay bytes nobody consumed
    pub fn into_inner(self) -> (S, BytesMut) {
        (self.reader.unsplit(self.writer), self.preread)
    }
}

impl<S> std::fmt::Debug for HandshakeTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeTransport")
            .field("preread", &self.preread.len())
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}

async fn send_into<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

async fn receive_into<R: AsyncRead + Unpin>(
    reader: &mut R,
    preread: &mut BytesMut,
    received: &mut usize,
    buf: &mut [u8],
) -> Result<()> {
    let replayed = preread.len().min(buf.len());
    if replayed > 0 {
        let chunk = preread.split_to(replayed);
        buf[..replayed].copy_from_slice(&chunk);
    }

    if replayed < buf.len() {
        reader.read_exact(&mut buf[replayed..]).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MseError::transport(
                    NetworkErrorKind::Eof,
                    format!("Peer closed connection after {} bytes", *received + replayed),
                )
            } else {
                MseError::from(e)
            }
        })?;
    }

    *received += buf.len();
    Ok(())
}
