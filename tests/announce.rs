#![forbid(unsafe_code)]

//! Responder-side handshake scenarios: happy path, re-announcement with
//! revocation keys, replay and impersonation defenses, garbage absorption.

use std::sync::Arc;

use data_encoding::BASE64;
use tordam::{
    config::{Config, FileConfig, Overrides},
    core::{
        identity::{onion_address, Identity},
        peers::PeerRegistry,
    },
    monitoring::metrics::Metrics,
    networking::announce::{self, AnnounceError, NONCE_LEN, REVOKE_LEN},
    node::Node,
};

fn test_node(dir: &std::path::Path) -> Arc<Node> {
    let cfg = Config::resolve(dir.to_path_buf(), FileConfig::default(), Overrides::default())
        .expect("config");
    let identity = Identity::from_seed(&[1u8; 32]).expect("identity");
    let onion = format!("{}:{}", identity.onion_address(), cfg.listen.port());
    Arc::new(Node {
        cfg,
        identity,
        peers: Arc::new(PeerRegistry::new(dir.join("peers.json"))),
        onion,
        socks_addr: "127.0.0.1:9050".parse().expect("socks addr"),
        metrics: Arc::new(Metrics::new().expect("metrics")),
    })
}

fn peer_identity(seed: u8) -> (Identity, String) {
    let id = Identity::from_seed(&[seed; 32]).expect("identity");
    let onion = format!("{}:666", onion_address(&id.public_key()));
    (id, onion)
}

fn init_params(id: &Identity, onion: &str) -> Vec<String> {
    vec![
        onion.to_string(),
        BASE64.encode(&id.public_key()),
        "12345:54321,666:3521".to_string(),
    ]
}

fn ascii_ok(s: &str) -> bool {
    s.bytes().all(|b| b > 32 && b < 127)
}

#[test]
fn init_then_validate_promotes_peer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);

    let ret = announce::init(&node, &init_params(&key, &onion)).expect("init");
    assert_eq!(ret.len(), 2);
    assert_eq!(ret[0].len(), NONCE_LEN);
    assert_eq!(ret[1].len(), REVOKE_LEN);
    assert!(ascii_ok(&ret[0]));
    assert!(ascii_ok(&ret[1]));

    let rec = node.peers.get(&onion).expect("record created");
    assert_eq!(rec.trusted, 0);
    assert_eq!(rec.nonce, ret[0]);
    assert_eq!(rec.peer_revoke, ret[1]);
    assert_eq!(rec.portmap, vec!["12345:54321", "666:3521"]);

    let sig = BASE64.encode(&key.sign(ret[0].as_bytes()));
    let peers = announce::validate(&node, &[onion.clone(), sig]).expect("validate");
    assert!(peers.contains(&onion));

    let rec = node.peers.get(&onion).expect("record kept");
    assert_eq!(rec.trusted, 1);
    assert!(rec.nonce.is_empty());
    assert!(!rec.peer_revoke.is_empty());
    assert!(rec.last_seen > 0);
}

#[test]
fn reannounce_requires_matching_revoke() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);

    let first = announce::init(&node, &init_params(&key, &onion)).expect("first init");
    let sig = BASE64.encode(&key.sign(first[0].as_bytes()));
    announce::validate(&node, &[onion.clone(), sig]).expect("first validate");
    let seen_1 = node.peers.get(&onion).expect("record").last_seen;

    // No revoke at all.
    assert!(matches!(
        announce::init(&node, &init_params(&key, &onion)),
        Err(AnnounceError::MissingRevoke)
    ));

    // Wrong revoke.
    let mut params = init_params(&key, &onion);
    params.push("x".repeat(REVOKE_LEN));
    assert!(matches!(
        announce::init(&node, &params),
        Err(AnnounceError::RevokeMismatch)
    ));

    // Record untouched by the rejected attempts.
    let rec = node.peers.get(&onion).expect("record");
    assert_eq!(rec.trusted, 1);
    assert_eq!(rec.peer_revoke, first[1]);

    // Correct revoke refreshes nonce and revoke; trust level survives.
    let mut params = init_params(&key, &onion);
    params.push(first[1].clone());
    let second = announce::init(&node, &params).expect("reannounce init");
    assert_ne!(second[0], first[0]);
    assert_ne!(second[1], first[1]);

    let sig = BASE64.encode(&key.sign(second[0].as_bytes()));
    announce::validate(&node, &[onion.clone(), sig]).expect("second validate");

    let rec = node.peers.get(&onion).expect("record");
    assert_eq!(rec.trusted, 1);
    assert!(rec.last_seen >= seen_1);
    // Still exactly one record for this peer.
    assert_eq!(node.peers.len(), 1);
}

#[test]
fn validate_replay_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);

    let ret = announce::init(&node, &init_params(&key, &onion)).expect("init");
    let sig = BASE64.encode(&key.sign(ret[0].as_bytes()));
    announce::validate(&node, &[onion.clone(), sig.clone()]).expect("validate");

    // Same signature again without a fresh Init: the nonce is gone.
    assert!(matches!(
        announce::validate(&node, &[onion.clone(), sig]),
        Err(AnnounceError::ValidateBeforeInit)
    ));
}

#[test]
fn impersonation_is_rejected_and_recoverable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);
    let (wrong_key, _) = peer_identity(8);

    let ret = announce::init(&node, &init_params(&key, &onion)).expect("init");

    let forged = BASE64.encode(&wrong_key.sign(ret[0].as_bytes()));
    assert!(matches!(
        announce::validate(&node, &[onion.clone(), forged]),
        Err(AnnounceError::SignatureInvalid)
    ));

    // Record survives at trust 0 with the nonce kept, so the genuine owner
    // can still finish or restart the handshake.
    let rec = node.peers.get(&onion).expect("record kept");
    assert_eq!(rec.trusted, 0);
    assert_eq!(rec.nonce, ret[0]);

    let mut params = init_params(&key, &onion);
    params.push(ret[1].clone());
    let fresh = announce::init(&node, &params).expect("init after failed validate");
    let sig = BASE64.encode(&key.sign(fresh[0].as_bytes()));
    announce::validate(&node, &[onion.clone(), sig]).expect("validate recovers");
}

#[test]
fn validate_before_init_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);
    let sig = BASE64.encode(&key.sign(b"whatever"));

    // Never seen at all.
    assert!(matches!(
        announce::validate(&node, &[onion.clone(), sig.clone()]),
        Err(AnnounceError::UnseenPeer)
    ));

    // Known only from an absorbed list: no pubkey yet.
    node.peers.absorb(&[onion.clone()]);
    assert!(matches!(
        announce::validate(&node, &[onion.clone(), sig]),
        Err(AnnounceError::ValidateBeforeInit)
    ));
}

#[test]
fn init_rejects_malformed_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (key, onion) = peer_identity(7);

    // Parameter count.
    assert!(matches!(
        announce::init(&node, &[onion.clone()]),
        Err(AnnounceError::InvalidParams)
    ));
    assert!(matches!(
        announce::validate(&node, &[onion.clone()]),
        Err(AnnounceError::InvalidParams)
    ));

    // Invalid onion identifier.
    let mut params = init_params(&key, &onion);
    params[0] = "not-an-onion".to_string();
    assert!(matches!(
        announce::init(&node, &params),
        Err(AnnounceError::InvalidOnion(_))
    ));

    // Broken base64 public key.
    let mut params = init_params(&key, &onion);
    params[1] = "!!!not base64!!!".to_string();
    assert!(matches!(
        announce::init(&node, &params),
        Err(AnnounceError::InvalidBase64(_))
    ));

    // Right base64, wrong key length.
    let mut params = init_params(&key, &onion);
    params[1] = BASE64.encode(b"short");
    assert!(matches!(
        announce::init(&node, &params),
        Err(AnnounceError::InvalidKeyLength)
    ));

    // Out-of-range portmap.
    let mut params = init_params(&key, &onion);
    params[2] = "101667:8130".to_string();
    assert!(matches!(
        announce::init(&node, &params),
        Err(AnnounceError::InvalidPortmap(_))
    ));

    // None of the rejected calls may have created a record.
    assert!(node.peers.get(&onion).is_none());
}

#[test]
fn absorb_keeps_only_valid_identifiers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = test_node(dir.path());
    let (_, good) = peer_identity(9);

    let (added, dropped) = node.peers.absorb(&[
        "not-an-onion".to_string(),
        "aaaa.onion:99999".to_string(),
        good.clone(),
    ]);
    assert_eq!(added, 1);
    assert_eq!(dropped, 2);
    assert_eq!(node.peers.len(), 1);
    assert!(node.peers.get(&good).is_some());

    // Re-absorbing the same identifier is a no-op.
    let (added, dropped) = node.peers.absorb(&[good.clone()]);
    assert_eq!((added, dropped), (0, 0));
}
