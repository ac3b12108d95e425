// Copyright (c) 2026 The tor-dam developers
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Sanity validators for onion addresses, peer identifiers and port maps.
//!
//! These are pure functions with no state. Everything that crosses a trust
//! boundary (RPC parameters, absorbed peer lists, configured seeds) goes
//! through them before it is allowed near the registry.

use data_encoding::BASE32;
use thiserror::Error;

/// Validation errors, naming the offending input and the violated rule.
#[derive(Debug, Error)]
pub enum SanityError {
    /// Onion address is not 56 characters long.
    #[error("invalid v3 onion address {addr:?} (len != 56)")]
    OnionAddressLength {
        /// The rejected address.
        addr: String,
    },
    /// Onion address does not decode as base32.
    #[error("invalid v3 onion address {addr:?} (not base32)")]
    OnionAddressEncoding {
        /// The rejected address.
        addr: String,
    },
    /// Peer identifier does not contain exactly one `host:port` separator.
    #[error("onion address {addr:?} doesn't contain a port")]
    MissingPort {
        /// The rejected identifier.
        addr: String,
    },
    /// Port is not a number.
    #[error("port {port:?} is invalid (not a number)")]
    PortNotNumeric {
        /// The rejected port string.
        port: String,
    },
    /// Port is outside [1, 65535].
    #[error("port {port} is invalid (!= 0 < port < 65536)")]
    PortOutOfRange {
        /// The rejected port value.
        port: u32,
    },
    /// Portmap entry is not of the form `src:dst`.
    #[error("invalid portmap {entry:?} (len != 2)")]
    PortmapFormat {
        /// The rejected entry.
        entry: String,
    },
}

/// Check that the given string is a valid Tor v3 hidden service address.
///
/// An optional `.onion` suffix is stripped before checking. The remaining
/// 56 characters must decode as RFC 4648 base32 after uppercasing.
pub fn validate_onion_address(addr: &str) -> Result<(), SanityError> {
    let stripped = addr.strip_suffix(".onion").unwrap_or(addr);
    let upper = stripped.to_uppercase();

    if upper.len() != 56 {
        return Err(SanityError::OnionAddressLength {
            addr: addr.to_string(),
        });
    }

    if BASE32.decode(upper.as_bytes()).is_err() {
        return Err(SanityError::OnionAddressEncoding {
            addr: addr.to_string(),
        });
    }

    Ok(())
}

/// Validate a peer identifier of the form `somename.onion:port`.
pub fn validate_onion_internal(onionaddr: &str) -> Result<(), SanityError> {
    let parts: Vec<&str> = onionaddr.split(':').collect();
    if parts.len() != 2 {
        return Err(SanityError::MissingPort {
            addr: onionaddr.to_string(),
        });
    }

    parse_port(parts[1])?;
    validate_onion_address(parts[0])
}

/// Validate a list of `srcPort:dstPort` mappings. An empty list is valid.
pub fn validate_portmap<S: AsRef<str>>(portmap: &[S]) -> Result<(), SanityError> {
    for entry in portmap {
        let entry = entry.as_ref();
        let ports: Vec<&str> = entry.split(':').collect();

        if ports.len() != 2 {
            return Err(SanityError::PortmapFormat {
                entry: entry.to_string(),
            });
        }

        for port in &ports {
            parse_port(port)?;
        }
    }
    Ok(())
}

fn parse_port(s: &str) -> Result<u16, SanityError> {
    let port: u32 = s.parse().map_err(|_| SanityError::PortNotNumeric {
        port: s.to_string(),
    })?;
    if !(1..=65535).contains(&port) {
        return Err(SanityError::PortOutOfRange { port });
    }
    Ok(port as u16)
}
