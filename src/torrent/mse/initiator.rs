//! MSE handshake, initiator side (outgoing connection)
//!
//! The initiator knows the torrent up front. It sends its DH value, then the
//! obfuscated torrent hash and its encrypted offer in one write, then locates
//! the responder's encrypted VC behind PadB and reads the selected method.

use tokio::io::{AsyncRead, AsyncWrite};

use super::common::{
    check_padding_len, decode_len, derive_ciphers, encode_len, masked_skey, parse_crypto_select,
    random_padding, req1_hash, Role,
};
use super::dh::DhKeyPair;
use super::sync::synchronize;
use super::transport::HandshakeTransport;
use super::{HandshakeOutcome, DH_KEY_LEN, INITIATOR_SYNC_BUDGET, VC};
use crate::config::MseConfig;
use crate::error::{MseError, Result};
use crate::torrent::Sha1Hash;

/// Outgoing handshake for one connection attempt
pub struct InitiatorHandshake<'a> {
    info_hash: Sha1Hash,
    config: &'a MseConfig,
    keypair: Option<DhKeyPair>,
    initial_payload: Vec<u8>,
}

impl<'a> InitiatorHandshake<'a> {
    /// Create a handshake for `info_hash`
    pub fn new(info_hash: Sha1Hash, config: &'a MseConfig) -> Self {
        Self {
            info_hash,
            config,
            keypair: None,
            initial_payload: Vec::new(),
        }
    }

    /// Use a fixed key pair instead of a fresh random one
    pub fn with_keypair(mut self, keypair: DhKeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Bytes to deliver encrypted inside the handshake (IA)
    ///
    /// Usually the plaintext BitTorrent handshake, which saves a round trip.
    pub fn with_initial_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.initial_payload = payload.into();
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
                tracing::debug!("MSE initiator handshake failed: {}", e);
                transport.dispose().await;
                Err(e)
            }
        }
    }

    async fn execute<S>(self, transport: &mut HandshakeTransport<S>) -> Result<HandshakeOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let provide = self.config.crypto_provide();
        if provide == 0 {
            return Err(MseError::invalid_input(
                "crypto_provide",
                "No crypto method enabled",
            ));
        }
        let ia_len = encode_len(self.initial_payload.len(), "initial_payload")?;
        let (min_pad, max_pad) = (self.config.min_padding, self.config.max_padding);

        // Step 1: Ya + PadA out, Yb in
        let keypair = self.keypair.unwrap_or_else(DhKeyPair::generate);
        let pad_a = random_padding(min_pad, max_pad);
        let mut step1 = Vec::with_capacity(DH_KEY_LEN + pad_a.len());
        step1.extend_from_slice(keypair.public_bytes());
        step1.extend_from_slice(&pad_a);

        let mut yb = [0u8; DH_KEY_LEN];
        transport.exchange(&step1, &mut yb).await?;
        tracing::trace!("MSE initiator sent Ya with {} bytes of PadA", pad_a.len());

        let secret = keypair.shared_secret(&yb);
        drop(keypair);

        // Step 3: HASH('req1', S), masked SKEY, ENC(VC, provide, PadC, IA)
        let mut ciphers = derive_ciphers(&secret, &self.info_hash, Role::Initiator);
        let pad_c = random_padding(min_pad, max_pad);

        let mut msg = Vec::with_capacity(40 + 16 + pad_c.len() + self.initial_payload.len());
        msg.extend_from_slice(&req1_hash(&secret));
        msg.extend_from_slice(&masked_skey(&self.info_hash, &secret));
        drop(secret);

        let encrypted_from = msg.len();
        msg.extend_from_slice(&VC);
        msg.extend_from_slice(&provide.to_be_bytes());
        msg.extend_from_slice(&encode_len(pad_c.len(), "pad_c")?);
        msg.extend_from_slice(&pad_c);
        msg.extend_from_slice(&ia_len);
        msg.extend_from_slice(&self.initial_payload);
        ciphers.encryptor.encrypt(&mut msg[encrypted_from..]);

        transport.send_all(&msg).await?;
        tracing::debug!(
            "MSE initiator sent crypto_provide {:#x} with {} bytes of IA",
            provide,
            self.initial_payload.len()
        );

        // Step 4: find ENC(VC) behind PadB
        let mut marker = VC;
        ciphers.decryptor.decrypt(&mut marker);
        synchronize(transport, &marker, INITIATOR_SYNC_BUDGET, "ENC(VC)").await?;

        let mut header = [0u8; 6];
        transport.receive_exact(&mut header).await?;
        ciphers.decryptor.decrypt(&mut header);

        let select = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let method = parse_crypto_select(select, provide)?;

        let pad_d_len = decode_len([header[4], header[5]]);
        check_padding_len(pad_d_len, "PadD")?;
        let mut pad_d = vec![0u8; pad_d_len];
        transport.receive_exact(&mut pad_d).await?;
        // keeps the keystream aligned with the responder's encryptor
        ciphers.decryptor.decrypt(&mut pad_d);

        let (encryptor, decryptor) = ciphers.commit(method);
        tracing::debug!("MSE initiator negotiated {}", method);

        Ok(HandshakeOutcome {
            encryptor,
            decryptor,
            leftover: Vec::new(),
            method,
            info_hash: self.info_hash,
        })
    }
}
