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

//! The announce responder: server side of the two-phase handshake.
//!
//! `ann.Init` proves nothing yet: it registers the claimed public key and
//! hands back a nonce to sign plus a fresh revocation key. `ann.Validate`
//! checks the signature over the nonce and promotes the peer to trusted.
//! A peer that announced before must present the revocation key we issued
//! to it, otherwise its record stays untouched.
//!
//! State machine per peer (cyclic on purpose, re-announcement is normal):
//!
//! ```text
//! UNKNOWN --Init(ok)--> PENDING --Validate(ok)--> TRUSTED
//!   ^                      |                         |
//!   |                      '--Validate(bad sig)--> PENDING (nonce kept)
//!   '--- Init on TRUSTED with matching revoke --> PENDING (fresh nonce)
//! ```

use data_encoding::BASE64;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    core::{
        identity::{self, random_ascii},
        peers::{unix_now, VALIDATED_SNAPSHOT_MAX},
        sanity::{validate_onion_internal, validate_portmap, SanityError},
    },
    networking::rpc,
    node::Node,
};

/// Length of the challenge nonce issued by Init.
pub const NONCE_LEN: usize = 32;
/// Length of the revocation key issued by Init.
pub const REVOKE_LEN: usize = 128;

/// Announce protocol failures, reported to the caller as RPC errors.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// Wrong number or shape of parameters.
    #[error("invalid parameters")]
    InvalidParams,
    /// The onion identifier failed validation.
    #[error(transparent)]
    InvalidOnion(#[from] SanityError),
    /// The portmap failed validation.
    #[error("invalid portmap: {0}")]
    InvalidPortmap(SanityError),
    /// A base64 field did not decode.
    #[error("invalid base64 {0}")]
    InvalidBase64(&'static str),
    /// The public key is not 32 bytes.
    #[error("invalid public key")]
    InvalidKeyLength,
    /// A known peer re-announced without a revocation key.
    #[error("no revocation key provided")]
    MissingRevoke,
    /// A known peer presented the wrong revocation key.
    #[error("revocation key doesn't match")]
    RevokeMismatch,
    /// Validate for an onion never seen before.
    #[error("this onion was not seen before")]
    UnseenPeer,
    /// Validate before a successful Init.
    #[error("tried to validate before init")]
    ValidateBeforeInit,
    /// The signature does not verify against the stored nonce and key.
    #[error("signature verification failed")]
    SignatureInvalid,
    /// RNG or serialization fault; details are logged, not reported.
    #[error("internal error")]
    Internal,
}

impl AnnounceError {
    /// JSON-RPC error code for this failure.
    pub fn rpc_code(&self) -> i64 {
        match self {
            AnnounceError::InvalidParams
            | AnnounceError::InvalidOnion(_)
            | AnnounceError::InvalidPortmap(_) => rpc::INVALID_PARAMS,
            AnnounceError::Internal => rpc::INTERNAL_ERROR,
            _ => rpc::SERVER_ERROR,
        }
    }
}

/// Handle `ann.Init`.
///
/// Parameters: `[onion, pubkey_b64, portmap_csv]`, plus `[revoke]` when the
/// peer announced to us before. Returns `[nonce, new_revoke]`.
pub fn init(node: &Node, params: &[String]) -> Result<Vec<String>, AnnounceError> {
    if params.len() != 3 && params.len() != 4 {
        return Err(AnnounceError::InvalidParams);
    }

    let onion = &params[0];
    validate_onion_internal(onion)?;
    info!(method = "ann.Init", onion = %onion, "got request");

    let existing = node.peers.get(onion);
    let really_seen = existing.as_ref().is_some_and(|p| p.really_seen());

    if really_seen {
        let expected = existing
            .as_ref()
            .map(|p| p.peer_revoke.clone())
            .unwrap_or_default();
        match params.get(3) {
            None => {
                warn!(method = "ann.Init", onion = %onion, "no revocation key provided");
                return Err(AnnounceError::MissingRevoke);
            }
            Some(revoke) => {
                if !bool::from(revoke.as_bytes().ct_eq(expected.as_bytes())) {
                    warn!(method = "ann.Init", onion = %onion, "revocation key doesn't match");
                    return Err(AnnounceError::RevokeMismatch);
                }
            }
        }
    }

    let pk = BASE64
        .decode(params[1].as_bytes())
        .map_err(|_| AnnounceError::InvalidBase64("public key"))?;
    let pubkey: [u8; 32] = pk
        .as_slice()
        .try_into()
        .map_err(|_| AnnounceError::InvalidKeyLength)?;

    let portmap: Vec<String> = params[2].split(',').map(str::to_string).collect();
    validate_portmap(&portmap).map_err(AnnounceError::InvalidPortmap)?;

    let nonce = random_ascii(NONCE_LEN).map_err(|e| {
        error!(method = "ann.Init", err = %e, "nonce generation failed");
        AnnounceError::Internal
    })?;
    let revoke = random_ascii(REVOKE_LEN).map_err(|e| {
        error!(method = "ann.Init", err = %e, "revoke generation failed");
        AnnounceError::Internal
    })?;

    node.peers
        .upsert_on_init(onion, pubkey, portmap, &nonce, &revoke, unix_now());
    node.peers.schedule_persist();

    Ok(vec![nonce, revoke])
}

/// Handle `ann.Validate`.
///
/// Parameters: `[onion, signature_b64]` where the signature covers the
/// ASCII bytes of the nonce issued by Init. Returns the validated peer
/// snapshot (at most [`VALIDATED_SNAPSHOT_MAX`] identifiers).
pub fn validate(node: &Node, params: &[String]) -> Result<Vec<String>, AnnounceError> {
    if params.len() != 2 {
        return Err(AnnounceError::InvalidParams);
    }

    let onion = &params[0];
    validate_onion_internal(onion)?;
    info!(method = "ann.Validate", onion = %onion, "got request");

    let peer = match node.peers.get(onion) {
        Some(peer) => peer,
        None => {
            warn!(method = "ann.Validate", onion = %onion, "not in peer map");
            return Err(AnnounceError::UnseenPeer);
        }
    };

    let Some(pubkey) = peer.pubkey else {
        warn!(method = "ann.Validate", onion = %onion, "tried to validate before init");
        return Err(AnnounceError::ValidateBeforeInit);
    };
    if peer.nonce.is_empty() {
        warn!(method = "ann.Validate", onion = %onion, "tried to validate before init");
        return Err(AnnounceError::ValidateBeforeInit);
    }

    let sig = BASE64
        .decode(params[1].as_bytes())
        .map_err(|_| AnnounceError::InvalidBase64("signature"))?;

    if identity::verify(&pubkey, peer.nonce.as_bytes(), &sig).is_err() {
        warn!(method = "ann.Validate", onion = %onion, "signature verification failed");
        return Err(AnnounceError::SignatureInvalid);
    }

    info!(method = "ann.Validate", onion = %onion, "validation success");

    node.peers.promote_on_validate(onion, unix_now());
    let ret = node.peers.validated_peers(VALIDATED_SNAPSHOT_MAX);
    node.peers.schedule_persist();

    Ok(ret)
}
