#![forbid(unsafe_code)]

use std::{collections::HashMap, sync::Arc};

use data_encoding::BASE64;
use proptest::prelude::*;
use tordam::{
    config::{Config, FileConfig, Overrides},
    core::{
        identity::{onion_address, random_ascii, Identity},
        peers::{Peer, PeerRegistry},
        sanity::validate_onion_internal,
    },
    monitoring::metrics::Metrics,
    networking::announce::{self, NONCE_LEN, REVOKE_LEN},
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

fn in_alphabet(s: &str) -> bool {
    s.bytes().all(|b| b > 32 && b < 127)
}

proptest! {
    #[test]
    fn prop_random_ascii_length_and_alphabet(len in 0usize..512) {
        let s = random_ascii(len).expect("random_ascii");
        prop_assert_eq!(s.len(), len);
        prop_assert!(in_alphabet(&s));
    }

    #[test]
    fn prop_handshake_accepts_any_keypair(
        seed in any::<[u8; 32]>(),
        port in 1u16..=65535,
        src in 1u16..=65535,
        dst in 1u16..=65535,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let node = test_node(dir.path());

        let key = Identity::from_seed(&seed).expect("peer identity");
        let onion = format!("{}:{}", onion_address(&key.public_key()), port);
        let params = vec![
            onion.clone(),
            BASE64.encode(&key.public_key()),
            format!("{src}:{dst}"),
        ];

        let ret = announce::init(&node, &params).expect("init");
        prop_assert_eq!(ret.len(), 2);
        prop_assert_eq!(ret[0].len(), NONCE_LEN);
        prop_assert_eq!(ret[1].len(), REVOKE_LEN);
        prop_assert!(in_alphabet(&ret[0]));
        prop_assert!(in_alphabet(&ret[1]));

        let sig = BASE64.encode(&key.sign(ret[0].as_bytes()));
        let peers = announce::validate(&node, &[onion.clone(), sig]).expect("validate");
        prop_assert!(peers.contains(&onion));

        // Every identifier the registry hands out is well-formed.
        for id in &peers {
            prop_assert!(validate_onion_internal(id).is_ok());
        }
    }

    #[test]
    fn prop_absorb_never_admits_garbage(ids in proptest::collection::vec(".{0,80}", 0..16)) {
        let dir = tempfile::tempdir().expect("tempdir");
        let reg = PeerRegistry::new(dir.path().join("peers.json"));

        reg.absorb(&ids);

        let dump: HashMap<String, Peer> =
            serde_json::from_str(&reg.export_json().expect("export")).expect("parse dump");
        for id in dump.keys() {
            prop_assert!(validate_onion_internal(id).is_ok());
        }
    }

    #[test]
    fn prop_forged_signatures_never_promote(
        seed in any::<[u8; 32]>(),
        wrong_seed in any::<[u8; 32]>(),
    ) {
        prop_assume!(seed != wrong_seed);

        let dir = tempfile::tempdir().expect("tempdir");
        let node = test_node(dir.path());

        let key = Identity::from_seed(&seed).expect("peer identity");
        let wrong = Identity::from_seed(&wrong_seed).expect("wrong identity");
        let onion = format!("{}:443", onion_address(&key.public_key()));
        let params = vec![
            onion.clone(),
            BASE64.encode(&key.public_key()),
            String::from("80:80"),
        ];

        let ret = announce::init(&node, &params).expect("init");
        let forged = BASE64.encode(&wrong.sign(ret[0].as_bytes()));
        prop_assert!(announce::validate(&node, &[onion.clone(), forged]).is_err());

        let rec = node.peers.get(&onion).expect("record");
        prop_assert_eq!(rec.trusted, 0);
    }
}
