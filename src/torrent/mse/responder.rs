//! MSE handshake, responder side (incoming connection)
//!
//! The responder does not know which torrent the peer wants. It finds
//! `HASH('req1', S)` behind PadA, identifies the torrent by unmasking the
//! obfuscated SKEY against the registry, verifies VC, collects the initial
//! payload and answers with its selection.

use tokio::io::{AsyncRead, AsyncWrite};

use super::common::{
    check_padding_len, decode_len, derive_ciphers, encode_len, random_padding, req1_hash,
    req3_hash, select_cipher, Role,
};
use super::dh::DhKeyPair;
use super::sync::synchronize;
use super::transport::HandshakeTransport;
use super::{HandshakeOutcome, DH_KEY_LEN, RESPONDER_SYNC_BUDGET, VC};
use crate::config::MseConfig;
use crate::error::{MseError, Result};
use crate::torrent::registry::TorrentRegistry;

/// Masked SKEY (20) + ENC(VC) (8) + ENC(crypto_provide) (4) + ENC(len(PadC)) (2)
const VERIFICATION_BLOCK_LEN: usize = 20 + 8 + 4 + 2;

/// Incoming handshake for one connection
pub struct ResponderHandshake<'a> {
    registry: &'a dyn TorrentRegistry,
    config: &'a MseConfig,
    keypair: Option<DhKeyPair>,
}

impl<'a> ResponderHandshake<'a> {
    /// Create a handshake that accepts any torrent in `registry`
    pub fn new(registry: &'a dyn TorrentRegistry, config: &'a MseConfig) -> Self {
        Self {
            registry,
            config,
            keypair: None,
        }
    }

    /// Use a fixed key pair instead of a fresh random one
    pub fn with_keypair(mut self, keypair: DhKeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Run the handshake to completion
    ///
    /// On failure the connection is shut down before the error is returned.
    pub async fn run<S>(
        self,
        mut transport: HandshakeTransport<S>,
    ) -> Result<(HandshakeOutcome, HandshakeTransport<S>)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.execute(&mut transport).await {
            Ok(outcome) => Ok((outcome, transport)),
            Err(e) => {
                tracing::debug!("MSE responder handshake failed: {}", e);
                transport.dispose().await;
                Err(e)
            }
        }
    }

    async fn execute<S>(self, transport: &mut HandshakeTransport<S>) -> Result<HandshakeOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let allowed = self.config.crypto_provide();
        let (min_pad, max_pad) = (self.config.min_padding, self.config.max_padding);

        // Step 2: Yb + PadB out, Ya in
        let keypair = self.keypair.unwrap_or_else(DhKeyPair::generate);
        let pad_b = random_padding(min_pad, max_pad);
        let mut step2 = Vec::with_capacity(DH_KEY_LEN + pad_b.len());
        step2.extend_from_slice(keypair.public_bytes());
        step2.extend_from_slice(&pad_b);

        let mut ya = [0u8; DH_KEY_LEN];
        transport.exchange(&step2, &mut ya).await?;
        tracing::trace!("MSE responder sent Yb with {} bytes of PadB", pad_b.len());

        let secret = keypair.shared_secret(&ya);
        drop(keypair);

        // Step 3: find HASH('req1', S) behind PadA
        synchronize(
            transport,
            &req1_hash(&secret),
            RESPONDER_SYNC_BUDGET,
            "HASH('req1', S)",
        )
        .await?;

        let mut block = [0u8; VERIFICATION_BLOCK_LEN];
        transport.receive_exact(&mut block).await?;

        let mut masked = [0u8; 20];
        masked.copy_from_slice(&block[..20]);
        let info_hash = self
            .registry
            .find_masked(&masked, &req3_hash(&secret))
            .ok_or(MseError::UnknownTorrent)?;

        let mut ciphers = derive_ciphers(&secret, &info_hash, Role::Responder);
        drop(secret);

        let encrypted = &mut block[20..];
        ciphers.decryptor.decrypt(encrypted);
        if encrypted[..8] != VC {
            return Err(MseError::VerificationFailed);
        }

        let provide = u32::from_be_bytes([encrypted[8], encrypted[9], encrypted[10], encrypted[11]]);
        let pad_c_len = decode_len([encrypted[12], encrypted[13]]);
        check_padding_len(pad_c_len, "PadC")?;

        let mut pad_c = vec![0u8; pad_c_len];
        transport.receive_exact(&mut pad_c).await?;
        ciphers.decryptor.decrypt(&mut pad_c);

        let mut ia_len = [0u8; 2];
        transport.receive_exact(&mut ia_len).await?;
        ciphers.decryptor.decrypt(&mut ia_len);

        let mut initial_payload = vec![0u8; decode_len(ia_len)];
        transport.receive_exact(&mut initial_payload).await?;
        ciphers.decryptor.decrypt(&mut initial_payload);
        tracing::debug!(
            "MSE responder matched torrent, crypto_provide {:#x}, {} bytes of IA",
            provide,
            initial_payload.len()
        );

        // Step 4: ENC(VC, crypto_select, len(PadD), PadD) with the framing cipher
        let method = select_cipher(provide, allowed)?;
        let pad_d = random_padding(min_pad, max_pad);

        let mut reply = Vec::with_capacity(VC.len() + 6 + pad_d.len());
        reply.extend_from_slice(&VC);
        reply.extend_from_slice(&method.bit().to_be_bytes());
        reply.extend_from_slice(&encode_len(pad_d.len(), "pad_d")?);
        reply.extend_from_slice(&pad_d);
        ciphers.encryptor.encrypt(&mut reply);
        transport.send_all(&reply).await?;

        // Only now may the session ciphers replace the framing ciphers
        let (encryptor, decryptor) = ciphers.commit(method);
        tracing::debug!("MSE responder negotiated {}", method);

        Ok(HandshakeOutcome {
            encryptor,
            decryptor,
            leftover: initial_payload,
            method,
            info_hash,
        })
    }
}
