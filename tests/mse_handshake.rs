//! MSE Handshake Integration Tests
//!
//! These tests run both handshake roles against each other over in-memory
//! pipes and loopback TCP, plus a byte-exact transcript check against fixed
//! keys.


use std::time::Duration;

use gosh_mse::torrent::plaintext_handshake;
use gosh_mse::{
    accept_with_mse, connect_with_mse, negotiate, CryptoMethod, Direction, DhKeyPair,
    EncryptionPolicy, HandshakeTransport, InitiatorHandshake, MseConfig, MseError,
    SharedRegistry, TcpConnector,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use test_helpers::{
    handshake_pair, init_tracing, padded_config, random_info_hash, test_peer_id, unhex,
    PlaintextOnlyPeer,
};

/// Public value of the responder key 0x21..=0x34
const GOLDEN_YB: &str = "8f9c9f400fe9b3258f3e48598a95c7805cc90c995cd770283322679d132ebdae\
09b75eeadc01de698ef86945cf38314a95fad08c2ad5641802bd5f658eb3ea0d\
b2712c04aa5efed03deecc5104f75d869d2d197e4336c61f0d71d763bee99416";

/// Ya, HASH('req1', S), masked SKEY and ENC(VC, 0x03, 0, 9, "golden IA")
/// for the initiator key 0x01..=0x14 and info hash 0xAB repeated
const GOLDEN_INITIATOR: &str = "96e112dab29e8c5272accb9b17b26887ce54a144a4e3b697c7d159b7a817e556\
b0918db2b4c658e02a87f7e5fb14b18a553e084cbf3dad2d30f16596ccb982d4\
06258c61b30c5c1dae2ddc60bdbd48d79896312aad63238c39e1a633821eb693\
361e3668027ecec9d1086d5f839d191781e8de17e88a475aee0852a6ad95db87\
a8aa81f48b2b1bc37cbf57713e63265c736aafc6c83efa2a6b439178761fbd7e\
51";

fn sequential_key(start: u8) -> [u8; 20] {
    let mut key = [0u8; 20];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = start + i as u8;
    }
    key
}

#[tokio::test]
async fn test_handshake_round_trip_with_initial_payload() {
    init_tracing();
    let info_hash = random_info_hash();
    let initial_payload = plaintext_handshake(&info_hash, &test_peer_id());
    let config = MseConfig::default();

    let (outgoing, incoming) = handshake_pair(
        info_hash,
        vec![random_info_hash(), info_hash],
        &config,
        &config,
        initial_payload.clone(),
    )
    .await;
    let outgoing = outgoing.unwrap();
    let incoming = incoming.unwrap();

    assert_eq!(outgoing.method, Some(CryptoMethod::Rc4));
    assert_eq!(incoming.method, Some(CryptoMethod::Rc4));
    assert_eq!(incoming.info_hash, Some(info_hash));
    assert_eq!(incoming.leftover, initial_payload);
    assert!(outgoing.leftover.is_empty());

    let mut a = outgoing.into_stream();
    let mut b = incoming.into_stream();

    let mut buf = vec![0u8; initial_payload.len()];
    b.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, initial_payload);

    a.write_all(b"interested").await.unwrap();
    let mut buf = [0u8; 10];
    b.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"interested");

    b.write_all(b"unchoke").await.unwrap();
    let mut buf = [0u8; 7];
    a.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"unchoke");
}

#[tokio::test]
async fn test_header_only_leaves_payload_in_clear() {
    let info_hash = random_info_hash();
    let initiator_config = MseConfig::default();
    let responder_config = MseConfig::default().crypto(true, false);

    let (outgoing, incoming) = handshake_pair(
        info_hash,
        vec![info_hash],
        &initiator_config,
        &responder_config,
        Vec::new(),
    )
    .await;
    let outgoing = outgoing.unwrap();
    let mut incoming = incoming.unwrap();

    assert_eq!(outgoing.method, Some(CryptoMethod::Plaintext));
    assert_eq!(incoming.method, Some(CryptoMethod::Plaintext));

    let mut a = outgoing.into_stream();
    assert!(!a.is_encrypted());
    a.write_all(b"bitfield").await.unwrap();

    // raw socket bytes are the payload itself
    let mut buf = [0u8; 8];
    incoming.stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"bitfield");
}

#[tokio::test]
async fn test_unknown_torrent_is_rejected() {
    let config = MseConfig::default();
    let (outgoing, incoming) = handshake_pair(
        random_info_hash(),
        vec![random_info_hash()],
        &config,
        &config,
        Vec::new(),
    )
    .await;

    assert!(matches!(incoming.err().unwrap(), MseError::UnknownTorrent));
    assert!(outgoing.is_err());
}

#[tokio::test]
async fn test_no_shared_cipher_is_rejected() {
    let info_hash = random_info_hash();
    let initiator_config = MseConfig::default().crypto(false, true);
    let responder_config = MseConfig::default().crypto(true, false);

    let (outgoing, incoming) = handshake_pair(
        info_hash,
        vec![info_hash],
        &initiator_config,
        &responder_config,
        Vec::new(),
    )
    .await;

    assert!(matches!(
        incoming.err().unwrap(),
        MseError::NoCompatibleCipher { provided: 0x02, allowed: 0x01 }
    ));
    assert!(outgoing.is_err());
}

#[tokio::test]
async fn test_padding_lengths_do_not_matter() {
    let info_hash = random_info_hash();
    let cases = [(0, 0), (1, 1), (511, 511), (512, 512), (0, 512), (512, 0)];

    for (initiator_pad, responder_pad) in cases {
        let (outgoing, incoming) = handshake_pair(
            info_hash,
            vec![info_hash],
            &padded_config(initiator_pad),
            &padded_config(responder_pad),
            b"payload".to_vec(),
        )
        .await;
        let outgoing = outgoing.unwrap_or_else(|e| {
            panic!("initiator failed with pads {initiator_pad}/{responder_pad}: {e}")
        });
        let incoming = incoming.unwrap_or_else(|e| {
            panic!("responder failed with pads {initiator_pad}/{responder_pad}: {e}")
        });
        assert_eq!(incoming.leftover, b"payload");

        let mut a = outgoing.into_stream();
        let mut b = incoming.into_stream();
        let mut buf = [0u8; 7];
        b.read_exact(&mut buf).await.unwrap();
        a.write_all(b"have").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"have");
    }
}

#[tokio::test]
async fn test_random_padding_stress() {
    let info_hash = random_info_hash();
    let config = MseConfig::default();

    for _ in 0..16 {
        let (outgoing, incoming) =
            handshake_pair(info_hash, vec![info_hash], &config, &config, Vec::new()).await;
        assert!(outgoing.is_ok());
        assert!(incoming.is_ok());
    }
}

#[tokio::test]
async fn test_negotiate_by_direction_with_shared_registry() {
    let registry = SharedRegistry::new();
    let info_hash = random_info_hash();
    registry.insert(info_hash);
    let config = MseConfig::default().policy(EncryptionPolicy::Required);

    let (a, b) = duplex(1 << 16);
    let (outgoing, incoming) = tokio::join!(
        negotiate(a, Direction::Outgoing(info_hash), &registry, &config),
        negotiate(b, Direction::Incoming, &registry, &config),
    );
    assert!(outgoing.unwrap().is_mse());
    assert_eq!(incoming.unwrap().info_hash, Some(info_hash));
}

#[tokio::test]
async fn test_golden_initiator_transcript() {
    let (local, mut remote) = duplex(4096);
    let config = MseConfig::default().padding(0, 0);
    let info_hash = [0xABu8; 20];

    let responder_key = DhKeyPair::from_private(&sequential_key(0x21));
    assert_eq!(&responder_key.public_bytes()[..], &unhex(GOLDEN_YB)[..]);

    let initiator = tokio::spawn(async move {
        InitiatorHandshake::new(info_hash, &config)
            .with_keypair(DhKeyPair::from_private(&sequential_key(0x01)))
            .with_initial_payload(b"golden IA".to_vec())
            .run(HandshakeTransport::new(local))
            .await
            .map(|_| ())
    });

    remote.write_all(responder_key.public_bytes()).await.unwrap();
    let expected = unhex(GOLDEN_INITIATOR);
    let mut transcript = vec![0u8; expected.len()];
    remote.read_exact(&mut transcript).await.unwrap();
    assert_eq!(hex::encode(&transcript), hex::encode(&expected));

    // no reply, the initiator gives up once the pipe closes
    drop(remote);
    assert!(initiator.await.unwrap().is_err());
}

#[tokio::test]
async fn test_tcp_loopback() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = random_info_hash();
    let registry: SharedRegistry = [info_hash].into_iter().collect();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut stream = accept_with_mse(socket, &registry, &MseConfig::default())
            .await
            .unwrap();
        let mut buf = vec![0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(b"welcome").await.unwrap();
        (buf, stream.crypto_method())
    });

    let initial_payload = plaintext_handshake(&info_hash, &test_peer_id());
    let mut connector = TcpConnector::new(addr);
    connector.connect_timeout = Duration::from_secs(5);
    let mut stream = connect_with_mse(
        &connector,
        info_hash,
        &MseConfig::default(),
        initial_payload.clone(),
    )
    .await
    .unwrap();
    assert_eq!(stream.peer_addr().unwrap(), addr);
    assert_eq!(stream.crypto_method(), Some(CryptoMethod::Rc4));

    let mut buf = [0u8; 7];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"welcome");

    let (received, method) = server.await.unwrap();
    assert_eq!(received, initial_payload);
    assert_eq!(method, Some(CryptoMethod::Rc4));
}

#[tokio::test]
async fn test_preferred_falls_back_to_plaintext() {
    let peer = PlaintextOnlyPeer::bind().await;
    let connector = TcpConnector::new(peer.addr());
    let server = tokio::spawn(peer.serve(b"ok"));

    let info_hash = random_info_hash();
    let initial_payload = plaintext_handshake(&info_hash, &test_peer_id());
    let mut stream = connect_with_mse(
        &connector,
        info_hash,
        &MseConfig::default(),
        initial_payload.clone(),
    )
    .await
    .unwrap();
    assert_eq!(stream.crypto_method(), None);

    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ok");
    assert_eq!(server.await.unwrap(), initial_payload);
}

#[tokio::test]
async fn test_required_does_not_fall_back() {
    let peer = PlaintextOnlyPeer::bind().await;
    let connector = TcpConnector::new(peer.addr());
    let server = tokio::spawn(peer.serve(b"ok"));

    let config = MseConfig::default().policy(EncryptionPolicy::Required);
    let result = connect_with_mse(&connector, random_info_hash(), &config, Vec::new()).await;
    assert!(matches!(result.err().unwrap(), MseError::Transport { .. }));
    server.abort();
}
