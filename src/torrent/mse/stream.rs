//! Encrypted stream wrapper that provides transparent encryption/decryption
//! once the handshake has completed

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::cipher::StreamCipher;
use super::CryptoMethod;

/// Keyed peer connection
///
/// Bytes that arrived bundled with the handshake (the responder's IA, or a
/// peeked plaintext header) are served before anything is read from the
/// socket. They are already plaintext.
pub struct EncryptedStream<S> {
    inner: S,
    /// Cipher for outgoing data
    encrypt_cipher: StreamCipher,
    /// Cipher for incoming data
    decrypt_cipher: StreamCipher,
    /// Plaintext bytes to return before reading from `inner`
    pending: Vec<u8>,
    /// Selected crypto method, None when no MSE handshake took place
    crypto_method: Option<CryptoMethod>,
}

impl<S> EncryptedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a new encrypted stream
    pub fn new(
        stream: S,
        encrypt_cipher: StreamCipher,
        decrypt_cipher: StreamCipher,
        pending: Vec<u8>,
        crypto_method: Option<CryptoMethod>,
    ) -> Self {
        Self {
            inner: stream,
            encrypt_cipher,
            decrypt_cipher,
            pending,
            crypto_method,
        }
    }

    /// Wrap a connection on which no handshake was negotiated
    pub fn plaintext(stream: S, pending: Vec<u8>) -> Self {
        Self::new(
            stream,
            StreamCipher::HeaderOnly,
            StreamCipher::HeaderOnly,
            pending,
            None,
        )
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        if n > 0 {
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
        }
        n
    }

    /// Read and decrypt data
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.take_pending(buf);
        if n > 0 {
            return Ok(n);
        }
        let n = self.inner.read(buf).await?;
        self.decrypt_cipher.decrypt(&mut buf[..n]);
        Ok(n)
    }

    /// Read exactly the requested amount of data
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let n = self.take_pending(buf);
        if n < buf.len() {
            let rest = &mut buf[n..];
            self.inner.read_exact(rest).await?;
            self.decrypt_cipher.decrypt(rest);
        }
        Ok(())
    }

    /// Encrypt and write data
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.encrypt_cipher.is_encrypted() {
            let encrypted = self.encrypt_cipher.encrypt_to_vec(buf);
            self.inner.write_all(&encrypted).await
        } else {
            self.inner.write_all(buf).await
        }
    }

    /// Flush the stream
    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    /// Shutdown the stream
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }

    /// Check if payload bytes are encrypted on the wire
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_cipher.is_encrypted()
    }

    /// Negotiated crypto method, None for a plain BitTorrent connection
    pub fn crypto_method(&self) -> Option<CryptoMethod> {
        self.crypto_method
    }

    /// Plaintext bytes not yet returned by a read
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Access the raw stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Split back into the raw stream, ciphers and unread plaintext
    pub fn into_parts(self) -> (S, StreamCipher, StreamCipher, Vec<u8>) {
        (
            self.inner,
            self.encrypt_cipher,
            self.decrypt_cipher,
            self.pending,
        )
    }
}

impl EncryptedStream<tokio::net::TcpStream> {
    /// Get peer address
    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.peer_addr()
    }

    /// Get local address
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_pending_served_first() {
        let (a, mut b) = duplex(1024);
        let mut stream = EncryptedStream::plaintext(a, b"early".to_vec());
        b.write_all(b" late").await.unwrap();

        let mut buf = [0u8; 10];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"early late");
        assert!(stream.pending().is_empty());
    }

    #[tokio::test]
    async fn test_rc4_round_trip() {
        let (a, b) = duplex(1024);
        let mut left = EncryptedStream::new(
            a,
            StreamCipher::rc4(b"up").unwrap(),
            StreamCipher::rc4(b"down").unwrap(),
            Vec::new(),
            Some(CryptoMethod::Rc4),
        );
        let mut right = EncryptedStream::new(
            b,
            StreamCipher::rc4(b"down").unwrap(),
            StreamCipher::rc4(b"up").unwrap(),
            Vec::new(),
            Some(CryptoMethod::Rc4),
        );

        left.write_all(b"ping from the left").await.unwrap();
        let mut buf = [0u8; 18];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping from the left");

        right.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        assert!(left.is_encrypted());
        assert_eq!(left.crypto_method(), Some(CryptoMethod::Rc4));
    }

    #[tokio::test]
    async fn test_wire_bytes_are_encrypted() {
        let (a, mut raw) = duplex(1024);
        let mut stream = EncryptedStream::new(
            a,
            StreamCipher::rc4(b"k").unwrap(),
            StreamCipher::HeaderOnly,
            Vec::new(),
            Some(CryptoMethod::Rc4),
        );
        stream.write_all(b"secret").await.unwrap();

        let mut buf = [0u8; 6];
        raw.read_exact(&mut buf).await.unwrap();
        assert_ne!(&buf, b"secret");
    }
}
