// Copyright (c) 2026 The tor-dam developers
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! The process-wide context threaded through every component.

use std::{net::SocketAddr, sync::Arc};

use crate::{
    config::Config,
    core::{identity::Identity, peers::PeerRegistry},
    monitoring::metrics::Metrics,
};

/// Everything the responder, initiator and fanout share.
///
/// The registry is the only mutable piece; the rest is fixed at startup
/// once Tor has published our hostname.
pub struct Node {
    /// Resolved runtime configuration.
    pub cfg: Config,
    /// Our Ed25519 signing identity.
    pub identity: Identity,
    /// The shared peer registry.
    pub peers: Arc<PeerRegistry>,
    /// Our own `host.onion:port` identifier.
    pub onion: String,
    /// SOCKS5 address of the supervised Tor daemon.
    pub socks_addr: SocketAddr,
    /// Process metrics.
    pub metrics: Arc<Metrics>,
}
