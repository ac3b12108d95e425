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

//! Node identity: the Ed25519 signing key and everything derived from it.
//!
//! The seed is stored on disk as base64 of the raw 32 bytes
//! (`<datadir>/ed25519.seed`, mode 0600). Tor is handed the same key, so the
//! onion address derived here matches the hostname Tor publishes.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use data_encoding::{BASE32, BASE64};
use ring::{
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroize;

/// Name of the seed file inside the data directory.
pub const SEED_FILE: &str = "ed25519.seed";

/// Identity errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io")]
    Io,
    #[error("invalid seed encoding")]
    InvalidSeed,
    #[error("rng failure")]
    Rng,
    #[error("bad signature")]
    BadSignature,
}

/// The process-wide Ed25519 signing identity.
pub struct Identity {
    keypair: Ed25519KeyPair,
}

impl Identity {
    /// Generate a fresh keypair and persist its seed under `dir`.
    pub fn generate(dir: &Path) -> Result<(), IdentityError> {
        fs::create_dir_all(dir).map_err(|_| IdentityError::Io)?;
        set_private_dir_perms_best_effort(dir);

        let rng = SystemRandom::new();
        let mut seed = [0u8; 32];
        rng.fill(&mut seed).map_err(|_| IdentityError::Rng)?;

        let seedpath = dir.join(SEED_FILE);
        info!(path = %seedpath.display(), "writing ed25519 key seed");

        let encoded = BASE64.encode(&seed);
        seed.zeroize();
        atomic_write_private(&seedpath, encoded.as_bytes())
    }

    /// Load an identity from the seed file under `dir`.
    pub fn load(dir: &Path) -> Result<Self, IdentityError> {
        let seedpath = dir.join(SEED_FILE);
        info!(path = %seedpath.display(), "reading ed25519 seed");

        let raw = fs::read_to_string(&seedpath).map_err(|_| IdentityError::Io)?;
        let mut seed = BASE64
            .decode(raw.trim().as_bytes())
            .map_err(|_| IdentityError::InvalidSeed)?;
        if seed.len() != 32 {
            seed.zeroize();
            return Err(IdentityError::InvalidSeed);
        }

        let keypair = Ed25519KeyPair::from_seed_unchecked(&seed);
        seed.zeroize();
        let keypair = keypair.map_err(|_| IdentityError::InvalidSeed)?;
        Ok(Self { keypair })
    }

    /// Build an identity directly from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, IdentityError> {
        let keypair =
            Ed25519KeyPair::from_seed_unchecked(seed).map_err(|_| IdentityError::InvalidSeed)?;
        Ok(Self { keypair })
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        out
    }

    /// Hex fingerprint of the public key, for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Sign a message, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        let sig = self.keypair.sign(msg);
        let mut out = [0u8; 64];
        out.copy_from_slice(sig.as_ref());
        out
    }

    /// The onion v3 address corresponding to this identity's public key.
    pub fn onion_address(&self) -> String {
        onion_address(&self.public_key())
    }
}

/// Verify an Ed25519 signature given raw public key bytes.
pub fn verify(pk: &[u8; 32], msg: &[u8], sig: &[u8]) -> Result<(), IdentityError> {
    if sig.len() != 64 {
        return Err(IdentityError::BadSignature);
    }
    let pk = UnparsedPublicKey::new(&ED25519, pk);
    pk.verify(msg, sig).map_err(|_| IdentityError::BadSignature)
}

/// Derive a Tor v3 onion address from an Ed25519 public key.
///
/// Layout is base32(pubkey || checksum || version) + ".onion" with
/// checksum = SHA3-256(".onion checksum" || pubkey || version)[..2] and
/// version = 0x03, per the Tor rendezvous v3 specification.
pub fn onion_address(pubkey: &[u8; 32]) -> String {
    const VERSION: u8 = 3;

    let mut hasher = Sha3_256::new();
    hasher.update(b".onion checksum");
    hasher.update(pubkey);
    hasher.update([VERSION]);
    let checksum = hasher.finalize();

    let mut raw = Vec::with_capacity(35);
    raw.extend_from_slice(pubkey);
    raw.extend_from_slice(&checksum[..2]);
    raw.push(VERSION);

    let mut addr = BASE32.encode(&raw).to_lowercase();
    addr.push_str(".onion");
    addr
}

/// Generate `len` random characters from the printable ASCII range,
/// byte values 33..=126. Used for handshake nonces and revocation keys.
///
/// Bytes are drawn from the system CSPRNG and rejection-sampled so the
/// result survives serialization through JSON text fields.
pub fn random_ascii(len: usize) -> Result<String, IdentityError> {
    let rng = SystemRandom::new();
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        rng.fill(&mut buf).map_err(|_| IdentityError::Rng)?;
        for &b in buf.iter() {
            if b > 32 && b < 127 {
                out.push(b as char);
                if out.len() == len {
                    break;
                }
            }
        }
    }
    Ok(out)
}

fn set_private_dir_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
    }
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write for key material (write to tmp, fsync, rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    let mut tmp = PathBuf::from(path);
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| IdentityError::Io)?;
        f.write_all(bytes).map_err(|_| IdentityError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| IdentityError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}
