#![forbid(unsafe_code)]

use tordam::core::sanity::{
    validate_onion_address, validate_onion_internal, validate_portmap, SanityError,
};

const VALID_ONION: &str = "p7qaewjgnvnaeihhyybmoofd5avh665kr3awoxlh5rt6ox743kjdr6qd.onion";

#[test]
fn onion_address_accepts_canonical() {
    validate_onion_address(VALID_ONION).expect("canonical address must validate");
    // Also without the .onion suffix.
    validate_onion_address("p7qaewjgnvnaeihhyybmoofd5avh665kr3awoxlh5rt6ox743kjdr6qd")
        .expect("suffix-less address must validate");
}

#[test]
fn onion_address_rejects_invalid() {
    // '1' is not in the base32 alphabet.
    let bad_base32 = "p7qaewjg1vnaeihhyybmoofd5avh665kr3awoxlh5rt6ox743kjdr6qd.onion";
    // Too short, twice.
    let short0 = "p7qaewjgvybmoofd5avh665kr3awoxlh5rt6ox743kjdr6qd.onion";
    let short1 = "p7qaewjgvybmoofd5avh665kr3awoxl1jdr6qd.onion";

    assert!(matches!(
        validate_onion_address(bad_base32),
        Err(SanityError::OnionAddressEncoding { .. })
    ));
    for addr in [short0, short1] {
        assert!(matches!(
            validate_onion_address(addr),
            Err(SanityError::OnionAddressLength { .. })
        ));
    }
}

#[test]
fn onion_internal_requires_single_port() {
    validate_onion_internal(&format!("{VALID_ONION}:49371")).expect("valid identifier");

    assert!(matches!(
        validate_onion_internal(VALID_ONION),
        Err(SanityError::MissingPort { .. })
    ));
    assert!(matches!(
        validate_onion_internal(&format!("{VALID_ONION}:1:2")),
        Err(SanityError::MissingPort { .. })
    ));
    assert!(matches!(
        validate_onion_internal(&format!("{VALID_ONION}:0")),
        Err(SanityError::PortOutOfRange { .. })
    ));
    assert!(matches!(
        validate_onion_internal(&format!("{VALID_ONION}:65536")),
        Err(SanityError::PortOutOfRange { .. })
    ));
    assert!(matches!(
        validate_onion_internal(&format!("{VALID_ONION}:foo")),
        Err(SanityError::PortNotNumeric { .. })
    ));
}

#[test]
fn portmap_vectors() {
    let valid: [&[&str]; 3] = [&["1234:3215"], &[], &["31983:35155", "31587:11"]];
    for pm in valid {
        validate_portmap(pm).expect("valid portmap");
    }

    assert!(matches!(
        validate_portmap(&["1515:315foo"]),
        Err(SanityError::PortNotNumeric { .. })
    ));
    assert!(matches!(
        validate_portmap(&["101667:8130", "1305:3191"]),
        Err(SanityError::PortOutOfRange { port: 101667 })
    ));
    assert!(matches!(
        validate_portmap(&["1234"]),
        Err(SanityError::PortmapFormat { .. })
    ));
    assert!(matches!(
        validate_portmap(&["1:2:3"]),
        Err(SanityError::PortmapFormat { .. })
    ));
}
