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

//! The announce initiator: client side of the two-phase handshake.
//!
//! Dials a peer through the local Tor SOCKS5 proxy, runs Init and Validate
//! against it, and absorbs the peer list it returns. The registry lock is
//! only taken for local mutations, never across the RPC round-trips.

use data_encoding::BASE64;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, info};

use crate::{
    core::sanity::{validate_onion_internal, SanityError},
    networking::rpc::{RpcClient, RpcError},
    node::Node,
};

/// Initiator failures, surfaced to the fanout loop.
#[derive(Debug, Error)]
pub enum InitiateError {
    /// The target identifier failed validation.
    #[error(transparent)]
    Sanity(#[from] SanityError),
    /// The SOCKS5 dial through Tor failed.
    #[error("dial failed: {0}")]
    Dial(String),
    /// An RPC call failed or timed out.
    #[error("rpc call failed: {0}")]
    Rpc(#[from] RpcError),
    /// The remote Init reply was not `[nonce, revoke]`.
    #[error("malformed init response")]
    BadResponse,
}

/// Announce ourselves to `onionaddr` through the local Tor SOCKS proxy.
pub async fn announce(node: &Node, onionaddr: &str) -> Result<(), InitiateError> {
    validate_onion_internal(onionaddr)?;
    info!(peer = %onionaddr, "announcing");

    let dial = Socks5Stream::connect(node.socks_addr, onionaddr);
    let stream = timeout(node.cfg.dial_timeout, dial)
        .await
        .map_err(|_| InitiateError::Dial("timed out".to_string()))?
        .map_err(|e| InitiateError::Dial(e.to_string()))?
        .into_inner();

    announce_stream(node, onionaddr, stream).await
}

/// Drive the handshake over an already-connected stream.
///
/// Split out from [`announce`] so the protocol can be exercised over any
/// transport (loopback TCP in tests, Tor in production).
pub async fn announce_stream<S>(node: &Node, onionaddr: &str, stream: S) -> Result<(), InitiateError>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let mut client = RpcClient::new(stream, node.cfg.rpc_timeout);

    let mut params = vec![
        node.onion.clone(),
        BASE64.encode(&node.identity.public_key()),
        node.cfg.portmap.join(","),
    ];
    // Not our first announce to this peer: present the revoke key it gave us.
    if let Some(revoke) = node.peers.self_revoke_for(onionaddr) {
        params.push(revoke);
    }

    let resp = client.call("ann.Init", params).await?;
    if resp.len() != 2 {
        return Err(InitiateError::BadResponse);
    }
    let nonce = &resp[0];
    debug!(peer = %onionaddr, "got nonce");

    // Stored before Validate so a failure later still leaves a usable
    // revoke key for the next announce.
    node.peers.store_self_revoke(onionaddr, &resp[1]);

    let sig = BASE64.encode(&node.identity.sign(nonce.as_bytes()));
    let newpeers = client
        .call("ann.Validate", vec![node.onion.clone(), sig])
        .await?;
    info!(peer = %onionaddr, "handshake valid");

    let foreign: Vec<&String> = newpeers.iter().filter(|p| **p != node.onion).collect();
    let (added, dropped) = node.peers.absorb(&foreign);
    if dropped > 0 {
        node.metrics.garbage_peers_total.inc_by(dropped as u64);
    }
    debug!(peer = %onionaddr, learned = added, dropped = dropped, "absorbed peer list");

    node.peers.schedule_persist();
    Ok(())
}
