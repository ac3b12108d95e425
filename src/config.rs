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

//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the optional `config.toml` in
//! the data directory, then command-line flags / environment (the binary
//! passes those in as [`Overrides`]). Flags win.

use std::{fs, net::SocketAddr, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::core::sanity::{validate_portmap, SanityError};

/// Default local JSON-RPC listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:49371";
/// Default port map exposed through the hidden service.
pub const DEFAULT_PORTMAP: &str = "13010:13010,13011:13011";
/// Default initial seed.
pub const DEFAULT_SEEDS: &str =
    "p7qaewjgnvnaeihhyybmoofd5avh665kr3awoxlh5rt6ox743kjdr6qd.onion:49371";

const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 90;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file")]
    Read,
    #[error("cannot parse config file")]
    Parse,
    #[error("invalid listen address {0:?}")]
    InvalidListen(String),
    #[error("invalid portmap: {0}")]
    InvalidPortmap(SanityError),
}

/// Resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Data directory holding keys, the peer DB and Tor state.
    pub datadir: PathBuf,
    /// Local JSON-RPC listen address.
    pub listen: SocketAddr,
    /// `src:dst` port mappings exposed through the hidden service.
    pub portmap: Vec<String>,
    /// Initial seed identifiers.
    pub seeds: Vec<String>,
    /// Whether to announce to peers at all.
    pub announce: bool,
    /// Re-announce interval in seconds; `None` or 0 announces once.
    pub announce_interval: Option<u64>,
    /// Timeout for the SOCKS5 dial through Tor.
    pub dial_timeout: Duration,
    /// Timeout for a single RPC call.
    pub rpc_timeout: Duration,
}

/// Values the binary collected from flags and environment. `None` falls
/// through to the config file, then to the default.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Listen address.
    pub listen: Option<String>,
    /// Comma-separated portmap.
    pub portmap: Option<String>,
    /// Comma-separated seed list.
    pub seeds: Option<String>,
    /// Disable announcing.
    pub no_announce: bool,
    /// Re-announce interval in seconds.
    pub announce_interval: Option<u64>,
}

/// Optional `config.toml` in the data directory.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Listen address.
    pub listen: Option<String>,
    /// Comma-separated portmap.
    pub portmap: Option<String>,
    /// Comma-separated seed list.
    pub seeds: Option<String>,
    /// Re-announce interval in seconds.
    pub announce_interval: Option<u64>,
    /// SOCKS5 dial timeout in seconds.
    pub dial_timeout_secs: Option<u64>,
    /// RPC call timeout in seconds.
    pub rpc_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load `<datadir>/config.toml`, or defaults when absent.
    pub fn load(datadir: &std::path::Path) -> Result<Self, ConfigError> {
        let path = datadir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|_| ConfigError::Read)?;
        toml::from_str(&raw).map_err(|_| ConfigError::Parse)
    }
}

impl Config {
    /// Merge defaults, file values and overrides into a validated config.
    pub fn resolve(
        datadir: PathBuf,
        file: FileConfig,
        over: Overrides,
    ) -> Result<Self, ConfigError> {
        let listen_raw = over
            .listen
            .or(file.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen_raw
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen_raw))?;

        let portmap_raw = over
            .portmap
            .or(file.portmap)
            .unwrap_or_else(|| DEFAULT_PORTMAP.to_string());
        let portmap = split_csv(&portmap_raw);
        validate_portmap(&portmap).map_err(ConfigError::InvalidPortmap)?;

        let seeds_raw = over
            .seeds
            .or(file.seeds)
            .unwrap_or_else(|| DEFAULT_SEEDS.to_string());
        let seeds = split_csv(&seeds_raw);

        let announce_interval = over.announce_interval.or(file.announce_interval);

        Ok(Self {
            datadir,
            listen,
            portmap,
            seeds,
            announce: !over.no_announce,
            announce_interval,
            dial_timeout: Duration::from_secs(
                file.dial_timeout_secs.unwrap_or(DEFAULT_DIAL_TIMEOUT_SECS),
            ),
            rpc_timeout: Duration::from_secs(
                file.rpc_timeout_secs.unwrap_or(DEFAULT_RPC_TIMEOUT_SECS),
            ),
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
