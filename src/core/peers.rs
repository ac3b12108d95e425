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

//! The peer registry: a process-wide map from `onion:port` identifier to
//! peer record, shared between the announce responder and the initiator.
//!
//! ## Access discipline
//! Every read or write takes the single registry lock for its duration and
//! the lock is never held across I/O. Operations spanning an RPC round-trip
//! take it only for the local mutation steps, so in-flight RPCs never block
//! each other on registry access.
//!
//! ## Persistence
//! The registry serializes to a JSON object keyed by identifier
//! (`<datadir>/peers.json`, mode 0600). Writes are debounced through a
//! semaphore with one permit: a mutation that cannot acquire it knows
//! another writer is in flight, and that writer snapshots under the lock,
//! so the newest state is always captured eventually.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::core::sanity::validate_onion_internal;

/// Name of the peer DB file inside the data directory.
pub const DB_FILE: &str = "peers.json";

/// Maximum number of identifiers returned in a validated-peers snapshot.
pub const VALIDATED_SNAPSHOT_MAX: usize = 50;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("serialization")]
    Serialize,
    #[error("io")]
    Io,
}

/// A single peer as tracked by the announce protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Ed25519 public key the peer asserts ownership of. Set by Init.
    #[serde(default, with = "pubkey_b64", skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<[u8; 32]>,
    /// Ports the peer exposes through its hidden service.
    #[serde(default)]
    pub portmap: Vec<String>,
    /// Pending challenge issued by Init, cleared by Validate. Empty when none.
    #[serde(default)]
    pub nonce: String,
    /// Revoke key this peer issued to us, presented on our next Init to them.
    #[serde(default)]
    pub self_revoke: String,
    /// Revoke key we issued to this peer, required on their next Init to us.
    #[serde(default)]
    pub peer_revoke: String,
    /// Unix seconds of the last successful handshake step.
    #[serde(default)]
    pub last_seen: i64,
    /// Trust level; >= 1 once Validate has succeeded at least once.
    #[serde(default)]
    pub trusted: u32,
}

impl Peer {
    /// Whether a handshake has completed with this peer before: either a
    /// public key is on record or a revocation key was issued to it.
    pub fn really_seen(&self) -> bool {
        self.pubkey.is_some() || !self.peer_revoke.is_empty()
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Process-wide peer registry.
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<String, Peer>>>,
    db_path: PathBuf,
    write_sem: Arc<Semaphore>,
}

impl PeerRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Peer>> {
        // Mutations are single atomic merges, so the map stays consistent
        // even if a holder panicked.
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create an empty registry persisting to `db_path`.
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            db_path,
            write_sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Create a registry, loading previously persisted state if present.
    ///
    /// Identifiers that no longer pass validation are dropped with a
    /// warning, so invariants hold across restarts.
    pub fn load_or_default(db_path: PathBuf) -> Self {
        let reg = Self::new(db_path);

        let raw = match std::fs::read_to_string(&reg.db_path) {
            Ok(raw) => raw,
            Err(_) => return reg,
        };

        match serde_json::from_str::<HashMap<String, Peer>>(&raw) {
            Ok(loaded) => {
                let mut peers = reg.lock();
                for (id, peer) in loaded {
                    let id = canonical(&id);
                    match validate_onion_internal(&id) {
                        Ok(()) => {
                            peers.insert(id, peer);
                        }
                        Err(e) => warn!(id = %id, err = %e, "dropping invalid peer from db"),
                    }
                }
                drop(peers);
                debug!(path = %reg.db_path.display(), count = reg.len(), "loaded peer db");
            }
            Err(e) => warn!(path = %reg.db_path.display(), err = %e, "unreadable peer db, starting empty"),
        }

        reg
    }

    /// Look up a peer record. Absence is a value, not an error.
    pub fn get(&self, id: &str) -> Option<Peer> {
        self.lock()
            .get(&canonical(id))
            .cloned()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic merge of the fields set by a successful Init.
    ///
    /// A new record starts at trust 0; an existing record keeps its trust
    /// level. `last_seen` never moves backwards.
    pub fn upsert_on_init(
        &self,
        id: &str,
        pubkey: [u8; 32],
        portmap: Vec<String>,
        nonce: &str,
        peer_revoke: &str,
        now: i64,
    ) {
        let mut peers = self.lock();
        let peer = peers.entry(canonical(id)).or_default();
        peer.pubkey = Some(pubkey);
        peer.portmap = portmap;
        peer.nonce = nonce.to_string();
        peer.peer_revoke = peer_revoke.to_string();
        peer.last_seen = peer.last_seen.max(now);
    }

    /// Clear the pending nonce and mark the peer validated.
    pub fn promote_on_validate(&self, id: &str, now: i64) {
        let mut peers = self.lock();
        if let Some(peer) = peers.get_mut(&canonical(id)) {
            peer.nonce.clear();
            peer.trusted = peer.trusted.max(1);
            peer.last_seen = peer.last_seen.max(now);
        }
    }

    /// Remember the revoke key a remote peer issued to us.
    pub fn store_self_revoke(&self, id: &str, revoke: &str) {
        let mut peers = self.lock();
        let peer = peers.entry(canonical(id)).or_default();
        peer.self_revoke = revoke.to_string();
    }

    /// The revoke key we hold for announcing to `id`, if any.
    pub fn self_revoke_for(&self, id: &str) -> Option<String> {
        self.lock()
            .get(&canonical(id))
            .map(|p| p.self_revoke.clone())
            .filter(|r| !r.is_empty())
    }

    /// Snapshot of identifiers with `trusted >= 1`, sorted, truncated to
    /// `limit`.
    pub fn validated_peers(&self, limit: usize) -> Vec<String> {
        let peers = self.lock();
        let mut out: Vec<String> = peers
            .iter()
            .filter(|(_, p)| p.trusted >= 1)
            .map(|(id, _)| id.clone())
            .collect();
        drop(peers);
        out.sort();
        out.truncate(limit);
        out
    }

    /// Absorb a list of identifiers learned from a peer. Unknown valid
    /// identifiers get an empty record at trust 0; garbage is logged and
    /// discarded. Returns `(added, dropped)`.
    pub fn absorb<S: AsRef<str>>(&self, ids: &[S]) -> (usize, usize) {
        let mut added = 0;
        let mut dropped = 0;

        for id in ids {
            let id = canonical(id.as_ref());
            if let Err(e) = validate_onion_internal(&id) {
                warn!(id = %id, err = %e, "received garbage peer");
                dropped += 1;
                continue;
            }
            let mut peers = self.lock();
            if !peers.contains_key(&id) {
                peers.insert(id, Peer::default());
                added += 1;
            }
        }

        (added, dropped)
    }

    /// Serialize the registry to a JSON object keyed by identifier.
    pub fn export_json(&self) -> Result<String, RegistryError> {
        let peers = self.lock();
        serde_json::to_string(&*peers).map_err(|_| RegistryError::Serialize)
    }

    /// Write the registry to its DB file right now.
    pub fn persist(&self) -> Result<(), RegistryError> {
        let json = self.export_json()?;
        write_private(&self.db_path, json.as_bytes())
    }

    /// Debounced persistence: try to acquire the write permit; when another
    /// write is already in flight, skip. That writer snapshots after this
    /// mutation and captures the newer state.
    pub fn schedule_persist(&self) {
        let permit = match self.write_sem.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("peer db write already in flight");
                return;
            }
        };

        // Sync callers without a runtime (tools, tests) write inline.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            if let Err(e) = self.persist() {
                warn!(err = %e, "failed to write peer db");
            }
            drop(permit);
            return;
        };

        let peers = Arc::clone(&self.peers);
        let db_path = self.db_path.clone();
        handle.spawn(async move {
            let json = {
                let guard = peers.lock().unwrap_or_else(|e| e.into_inner());
                serde_json::to_string(&*guard)
            };
            match json {
                Ok(json) => {
                    if let Err(e) = tokio::fs::write(&db_path, json).await {
                        warn!(path = %db_path.display(), err = %e, "failed to write peer db");
                    } else {
                        set_private_perms_best_effort(&db_path);
                    }
                }
                Err(e) => warn!(err = %e, "failed to serialize peer db"),
            }
            drop(permit);
        });
    }
}

/// Registry keys are canonical lowercase identifiers.
fn canonical(id: &str) -> String {
    id.to_lowercase()
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    std::fs::write(path, bytes).map_err(|_| RegistryError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

mod pubkey_b64 {
    //! Serde helpers storing the optional 32-byte pubkey as base64 text.

    use data_encoding::BASE64;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<[u8; 32]>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(pk) => s.serialize_some(&BASE64.encode(pk)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 32]>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) => {
                let bytes = BASE64
                    .decode(s.as_bytes())
                    .map_err(|e| D::Error::custom(format!("pubkey base64: {e}")))?;
                let pk: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| D::Error::custom("pubkey must be 32 bytes"))?;
                Ok(Some(pk))
            }
        }
    }
}
